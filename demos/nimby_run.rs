use dotenv::dotenv;
use nimby_radar::llm::anthropic::{self, AnthropicClient};
use nimby_radar::{processing_stats, NimbyAgent, NimbyPipeline, RepdLoader, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    println!("🚀 Starting NIMBY radar run...");

    let settings = Settings::from_env(anthropic::DEFAULT_MODEL)?;
    println!(
        "📋 Dataset: {} | model: {} | batch size: {}",
        settings.dataset.path.display(),
        settings.provider.model,
        settings.agent.max_records
    );

    let loader = RepdLoader::from_config(&settings.dataset);
    let dataset = loader.load()?;

    // Refusal delays give a quick sanity check that the file parsed as expected
    for year in processing_stats(&dataset)? {
        println!("   {}: mean {:.1} days to refusal", year.year, year.avg_delay);
    }

    let client = AnthropicClient::new(settings.provider.clone())?;
    let agent = NimbyAgent::new(client, settings.agent.clone());
    let pipeline = NimbyPipeline::from_parts(loader, agent);

    println!("🤖 Analysing cancelled projects...");
    let (outcome, summary) = pipeline.run().await?;

    for (record, analysis) in &outcome.pairs {
        println!(
            "\n🏷️  {} ({}, {:.1} MW)",
            record.site_name, record.technology_type, record.capacity_mw
        );
        println!("   {}", analysis.header);
        println!(
            "   NIMBY score {} | certainty {}: {}",
            analysis.nimby_score, analysis.certainty, analysis.certainty_meta
        );
        for fact in &analysis.interesting_information {
            println!("   - {}", fact);
        }
    }

    for failure in &outcome.failures {
        eprintln!(
            "⚠️  Skipped record #{} during {}: {}",
            failure.index, failure.stage, failure.error
        );
    }

    println!("\n📊 Mean certainty: {:.1}", summary.certainty);
    match summary.accuracy {
        Some(accuracy) => println!("📊 Mean accuracy:  {:.1}", accuracy),
        None => println!("📊 Mean accuracy:  n/a (no recognized labels)"),
    }
    println!(
        "✅ Summary appended to {}",
        settings.agent.eval_log_path.display()
    );

    Ok(())
}
