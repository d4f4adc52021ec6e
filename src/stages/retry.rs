use std::future::Future;

use tracing::{info, warn};

use crate::llm::BackendError;

/// Outcome of a bounded generate → extract → validate loop
pub struct RetryOutcome<T> {
    /// The accepted value, present only on success
    pub value: Option<T>,
    /// The last candidate that parsed, even if it failed validation.
    /// Lets a stage salvage a partial result on exhaustion.
    pub last_candidate: Option<T>,
    /// Raw model output from the most recent attempt
    pub last_raw: Option<String>,
    /// Cause of the most recent failure
    pub failure: Option<String>,
    pub attempts: u32,
}

impl<T> RetryOutcome<T> {
    /// Human-readable cause including the last raw output for diagnosis
    pub fn failure_message(&self) -> String {
        let cause = self
            .failure
            .clone()
            .unwrap_or_else(|| "retry budget exhausted".to_string());
        match &self.last_raw {
            Some(raw) => format!("{} (last output: {})", cause, raw),
            None => cause,
        }
    }
}

/// Drive a stage through its retry budget.
///
/// Generation errors, extraction failures, and validation failures each
/// consume one attempt. After a failure the next prompt carries a corrective
/// instruction describing exactly what was wrong.
pub async fn run_with_retry<T, G, Fut, P, V>(
    stage: &str,
    max_attempts: u32,
    mut generate: G,
    parse: P,
    validate: V,
) -> RetryOutcome<T>
where
    G: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<String, BackendError>>,
    P: Fn(&str) -> Option<T>,
    V: Fn(&T) -> Vec<String>,
{
    let mut outcome = RetryOutcome {
        value: None,
        last_candidate: None,
        last_raw: None,
        failure: None,
        attempts: 0,
    };
    let mut correction: Option<String> = None;

    while outcome.attempts < max_attempts {
        outcome.attempts += 1;
        if outcome.attempts > 1 {
            info!(
                "{}: attempt {} of {}",
                stage, outcome.attempts, max_attempts
            );
        }

        let raw = match generate(correction.clone()).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("{}: generation failed: {}", stage, e);
                outcome.failure = Some(format!("generation failed: {}", e));
                continue;
            }
        };
        outcome.last_raw = Some(raw.clone());

        let Some(candidate) = parse(&raw) else {
            warn!("{}: no valid structured payload in model output", stage);
            outcome.failure = Some("no valid structured payload in model output".to_string());
            correction = Some(
                "Your previous answer could not be parsed. Respond with ONLY the JSON object \
                 described above, with no surrounding text."
                    .to_string(),
            );
            continue;
        };

        let errors = validate(&candidate);
        if errors.is_empty() {
            outcome.value = Some(candidate);
            outcome.failure = None;
            return outcome;
        }

        warn!("{}: validation failed: {}", stage, errors.join("; "));
        outcome.failure = Some(format!("validation failed: {}", errors.join("; ")));
        correction = Some(build_correction(&errors));
        outcome.last_candidate = Some(candidate);
    }

    outcome
}

/// Corrective instruction appended to the next prompt after a validation
/// failure, naming exactly what was missing or out of range
pub fn build_correction(errors: &[String]) -> String {
    format!(
        "Your previous answer was rejected: {}. Respond again with ONLY the JSON object and \
         include every required key, even if a list must stay empty.",
        errors.join("; ")
    )
}
