// Prompt templates for the analysis and evaluation passes.

use serde::Serialize;

use crate::error::Result;
use crate::schema::AnalysisResult;

pub const ANALYSIS_ROLE: &str = r#"<ROLE>
You are a NIMBY radar. You hunt down renewable energy projects that were cancelled,
refused or abandoned, and you characterize the local opposition sentiment behind them.
Be vivid, but stay grounded in what the context supports.
</ROLE>"#;

pub const ANALYSIS_INSTRUCTIONS: &str = r#"<INSTRUCTIONS>
You will be given a project record from the UK Renewable Energy Planning Database.
The record is accurate; anything beyond it comes from your own knowledge.

1. Open with a short, pokedex style `header` summarizing the project and its fate.
2. Give a `nimby_score` for how strongly local opposition drove the outcome.
3. Give a `certainty` from 0 to 100 for how confident you are in this analysis.
4. Explain that certainty in `certainty_meta`. You will often not have enough information
   about a specific project: when unsure, say so plainly and name the information you
   would need to be more certain.
5. List short notable facts in `interesting_information`.

Return ONLY a JSON object with exactly these fields.
</INSTRUCTIONS>"#;

pub const ANALYSIS_EXAMPLE: &str = r#"<EXAMPLE OUTPUT>
{
  "header": "Proposed Solar Farm Opposition - High NIMBY sentiment over property values and wildlife.",
  "nimby_score": 8,
  "certainty": 90,
  "certainty_meta": "I am certain this project was cancelled after a sustained local campaign.",
  "interesting_information": [
    "Concerns over the impact on the local badger population"
  ]
}
</EXAMPLE OUTPUT>"#;

pub const EVALUATOR_ROLE: &str = r#"<ROLE>
You are an evaluator. You are given the source context for a renewable energy project and a
prior analysis of the opposition it faced. Judge how plausible that analysis is given the
context and what you know. Write only one concise sentence for your reasoning.
</ROLE>"#;

pub const EVALUATOR_INSTRUCTIONS: &str = r#"<INSTRUCTIONS>
Set `accuracy` to exactly one of: certain, high, medium, low.
Set `reasoning` to a single sentence justifying that label.
Return ONLY a JSON object with exactly these two fields.
</INSTRUCTIONS>"#;

pub const EVALUATOR_EXAMPLES: &str = r#"<EXAMPLE OUTPUT>
{"accuracy": "certain", "reasoning": "Proof exists in the planning decision notice."}
</EXAMPLE OUTPUT>
<EXAMPLE OUTPUT>
{"accuracy": "high", "reasoning": "Very likely to be true given the refusal and appeal dates."}
</EXAMPLE OUTPUT>
<EXAMPLE OUTPUT>
{"accuracy": "medium", "reasoning": "Potentially true but the opposition claims are unsourced."}
</EXAMPLE OUTPUT>
<EXAMPLE OUTPUT>
{"accuracy": "low", "reasoning": "Unlikely to be true; the record shows a developer withdrawal."}
</EXAMPLE OUTPUT>"#;

/// Serializes a prompt context with sorted object keys so equal inputs render identically.
pub fn render_context<T: Serialize + ?Sized>(context: &T) -> Result<String> {
    let value = serde_json::to_value(context)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Builds the first-pass request asking for a NIMBY analysis of `context`.
pub fn build_analysis_prompt<T: Serialize + ?Sized>(context: &T) -> Result<String> {
    let context = render_context(context)?;
    Ok(format!(
        "{}\n\n{}\n\n{}\n\n\
         The following context has been provided for you. Give an analysis of the project based on what you know.\n\n\
         <CONTEXT>\n{}\n</CONTEXT>\n",
        ANALYSIS_ROLE, ANALYSIS_INSTRUCTIONS, ANALYSIS_EXAMPLE, context
    ))
}

/// Builds the second-pass request asking how plausible `prior` is for `context`.
pub fn build_evaluation_prompt<T: Serialize + ?Sized>(
    context: &T,
    prior: &AnalysisResult,
) -> Result<String> {
    let context = render_context(context)?;
    let response = render_context(prior)?;
    Ok(format!(
        "{}\n\n{}\n\n{}\n\n\
         The following context and analysis have been provided for you.\n\n\
         <CONTEXT>\n{}\n</CONTEXT>\n\
         <RESPONSE>\n{}\n</RESPONSE>\n",
        EVALUATOR_ROLE, EVALUATOR_INSTRUCTIONS, EVALUATOR_EXAMPLES, context, response
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn prior() -> AnalysisResult {
        AnalysisResult {
            header: "Turbines turned away".to_string(),
            nimby_score: 9,
            certainty: 40,
            certainty_meta: "Little coverage exists".to_string(),
            interesting_information: vec!["Refused at committee".to_string()],
        }
    }

    #[test]
    fn test_analysis_prompt_embeds_context_verbatim() {
        let context = serde_json::json!({"Site Name": "Nether Moor", "Technology Type": "Wind Onshore"});
        let prompt = build_analysis_prompt(&context).unwrap();
        assert!(prompt.contains("NIMBY radar"));
        assert!(prompt.contains("when unsure"));
        assert!(prompt.contains("\"Site Name\": \"Nether Moor\""));
        assert!(prompt.contains("<EXAMPLE OUTPUT>"));
    }

    #[test]
    fn test_prompts_are_byte_identical_for_equal_input() {
        let mut a = HashMap::new();
        let mut b = HashMap::new();
        for (k, v) in [("zeta", "1"), ("alpha", "2"), ("mid", "3"), ("beta", "4")] {
            a.insert(k, v);
        }
        for (k, v) in [("beta", "4"), ("mid", "3"), ("alpha", "2"), ("zeta", "1")] {
            b.insert(k, v);
        }
        assert_eq!(
            build_analysis_prompt(&a).unwrap(),
            build_analysis_prompt(&b).unwrap()
        );
        assert_eq!(
            build_evaluation_prompt(&a, &prior()).unwrap(),
            build_evaluation_prompt(&b, &prior()).unwrap()
        );
    }

    #[test]
    fn test_context_keys_are_sorted() {
        let rendered = render_context(&serde_json::json!({"b": 1, "a": 2})).unwrap();
        assert!(rendered.find("\"a\"").unwrap() < rendered.find("\"b\"").unwrap());
    }

    #[test]
    fn test_evaluation_prompt_embeds_context_and_prior() {
        let context = serde_json::json!({"Site Name": "Nether Moor"});
        let prompt = build_evaluation_prompt(&context, &prior()).unwrap();
        assert!(prompt.contains("evaluator"));
        assert!(prompt.contains("one concise sentence"));
        assert!(prompt.contains("Nether Moor"));
        assert!(prompt.contains("Turbines turned away"));
        for label in ["certain", "high", "medium", "low"] {
            assert!(prompt.contains(&format!("\"accuracy\": \"{}\"", label)));
        }
    }
}
