use crate::models::{Guideline, Transcript};

/// Render a transcript as `Sender: text` lines in conversation order,
/// with a timestamp prefix when the upload recorded one
pub fn format_transcript(transcript: &Transcript) -> String {
    let lines: Vec<String> = transcript
        .messages
        .iter()
        .map(|message| match &message.timestamp {
            Some(ts) => format!(
                "[{}] {}: {}",
                ts.format("%Y-%m-%d %H:%M:%S"),
                message.sender.display(),
                message.text
            ),
            None => format!("{}: {}", message.sender.display(), message.text),
        })
        .collect();
    lines.join("\n")
}

/// Numbered variant used by the evaluation stage
pub fn format_transcript_numbered(transcript: &Transcript) -> String {
    let lines: Vec<String> = transcript
        .messages
        .iter()
        .enumerate()
        .map(|(i, message)| format!("{}. {}: {}", i + 1, message.sender.display(), message.text))
        .collect();
    lines.join("\n")
}

/// Build the evaluation prompt: numeric quality scoring of the exchange.
///
/// `extra_instructions` carries the corrective note appended on retries.
pub fn build_evaluation_prompt(transcript: &Transcript, extra_instructions: Option<&str>) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "Evaluate the following customer service chat transcript:\n\
         - coherence (1-5): how well the conversation flows\n\
         - relevance (1-5): how relevant the agent's responses are to the customer's needs\n\
         - politeness (1-5): how polite and professional the agent is\n\
         - resolution (0 or 1): whether the customer's issue was resolved\n\n\
         Respond with ONLY this JSON object and no other text:\n{\n  \
         \"coherence\": {\"score\": 4, \"reasoning\": \"...\"},\n  \
         \"relevance\": {\"score\": 4, \"reasoning\": \"...\"},\n  \
         \"politeness\": {\"score\": 5, \"reasoning\": \"...\"},\n  \
         \"resolution\": {\"score\": 1, \"reasoning\": \"...\"},\n  \
         \"summary\": \"overall evaluation in two or three sentences\"\n}\n\
         All five keys are required. Scores must be integers within their stated range.\n",
    );

    if let Some(extra) = extra_instructions {
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push_str("\nChat Transcript:\n\n");
    prompt.push_str(&format_transcript_numbered(transcript));
    prompt.push('\n');

    prompt
}

/// Build the analysis prompt: guideline compliance plus notable moments.
///
/// `case_hint` is an optional reviewer note about the conversation;
/// `extra_instructions` carries the corrective note appended on retries.
pub fn build_analysis_prompt(
    transcript: &Transcript,
    guidelines: &[Guideline],
    case_hint: Option<&str>,
    extra_instructions: Option<&str>,
) -> String {
    let guidelines_block: Vec<String> = guidelines
        .iter()
        .map(|g| format!("- {}: {}", g.key, g.description))
        .collect();

    let mut instruction = String::from(
        "Analyze the customer service conversation and return ONLY valid JSON with these exact keys: \
         'key_issues' (list of short strings), 'positive_highlights' (list of short strings), \
         and 'guideline_adherence' (list of objects with keys: guideline, status (Passed/Failed), \
         details (one sentence max)). Always include ALL keys, even if empty. \
         Do not include any explanation or text outside the JSON.",
    );
    if let Some(extra) = extra_instructions {
        instruction.push(' ');
        instruction.push_str(extra);
    }
    if let Some(hint) = case_hint {
        instruction.push_str(" Special Note: ");
        instruction.push_str(hint);
    }

    format!(
        "### Instruction:\n{}\n\n### Input:\nGuidelines:\n{}\n\nConversation:\n{}\n\n### Output:\n",
        instruction,
        guidelines_block.join("\n"),
        format_transcript(transcript)
    )
}

/// Build the recommendation prompt: coaching feedback derived from the
/// transcript and the two upstream stage summaries
pub fn build_recommendation_prompt(
    transcript: &Transcript,
    evaluation_summary: &str,
    analysis_summary: &str,
    extra_instructions: Option<&str>,
) -> String {
    let mut prompt = String::from(
        "You are a customer service coaching agent. Given the conversation transcript, \
         an evaluation summary, and an analysis summary:\n\
         1. Identify up to 2-3 short agent messages that could be improved. For each, give the \
         original text and a short improved rewrite.\n\
         2. Provide a long_term_coaching paragraph with actionable suggestions for the agent.\n\n\
         Respond with ONLY this JSON object and no other text:\n{\n  \
         \"specific_feedback\": [\n    \
         {\"original_text\": \"...\", \"suggested_text\": \"...\"}\n  ],\n  \
         \"long_term_coaching\": \"...\"\n}\n\
         Both keys are required; 'specific_feedback' may be empty only when no agent message \
         needs improvement.\n",
    );

    if let Some(extra) = extra_instructions {
        prompt.push_str(extra);
        prompt.push('\n');
    }

    prompt.push_str("\n---\nTRANSCRIPT:\n");
    prompt.push_str(&format_transcript(transcript));
    prompt.push_str("\n\nEVALUATION SUMMARY:\n");
    prompt.push_str(evaluation_summary);
    prompt.push_str("\n\nANALYSIS SUMMARY:\n");
    prompt.push_str(analysis_summary);
    prompt.push('\n');

    prompt
}
