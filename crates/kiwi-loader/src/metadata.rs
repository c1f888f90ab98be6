//! Metadata-extraction pass (§4.2): after a file is loaded, a single C1 call
//! produces a short structured description stored on the `ProjectFile`. Any
//! `<metadata>...</metadata>` tags the model echoes back into unit text are
//! stripped before indexing.

use once_cell::sync::Lazy;
use regex::Regex;

use kiwi_ai::AiClient;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

static METADATA_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<metadata>.*?</metadata>").expect("valid regex"));

/// Strips any `<metadata>` tags from text before it is staged as a text unit.
pub fn strip_metadata_tags(text: &str) -> String {
    METADATA_TAG.replace_all(text, "").trim().to_string()
}

const METADATA_PROMPT: &str = "Summarize this document in two or three sentences, noting its \
    apparent type (e.g. report, invoice, email, manual) and subject. Respond with plain text only.";

/// Produces a short structured description of a file's full text for storage
/// on `ProjectFile.metadata`, via a single C1 completion.
pub async fn describe_file(
    ai: &AiClient,
    full_text: &str,
    cancel: &CancellationToken,
) -> Result<String> {
    let prompt = format!("{METADATA_PROMPT}\n\n---\n\n{full_text}");
    let opts = kiwi_ai::types::CallOptions::default();
    let description = ai.complete(&prompt, &opts, cancel).await?;
    Ok(strip_metadata_tags(&description))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_single_metadata_tag() {
        let input = "Hello <metadata>{\"type\":\"invoice\"}</metadata> world";
        assert_eq!(strip_metadata_tags(input), "Hello  world");
    }

    #[test]
    fn strips_multiline_tag_case_insensitively() {
        let input = "before\n<METADATA>\nsome stray notes\n</METADATA>\nafter";
        assert_eq!(strip_metadata_tags(input), "before\n\nafter");
    }

    #[test]
    fn leaves_untagged_text_untouched() {
        assert_eq!(strip_metadata_tags("plain text"), "plain text");
    }
}
