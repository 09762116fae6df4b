//! System instruction templates and message assembly.
//!
//! The system instruction is always one of two static strings. User text only
//! ever travels in the user turn.

use once_cell::sync::Lazy;

use crate::provider::ChatMessage;

const BASE_PROMPT: &str = "You are an expert at analyzing AITA (Am I The Asshole) Reddit posts. \
Begin your response with a single line containing only your verdict: YTA, NTA, or ESH. \
When evaluating a post, carefully consider the context, emotions, and actions of all parties involved. \
Approach the analysis with empathy and objectivity, avoiding personal biases. \
Assess the situation from multiple perspectives and in light of social and cultural norms. \
Identify key factors that contribute to whether the poster is being unreasonable or acting like an asshole, \
and provide a clear, reasoned explanation supported by the details from the post. \
Format your response using markdown for better readability, using headers, bullet points, and emphasis where appropriate.";

const HUMANIZE_DIRECTIVE: &str = "Write the analysis in a warm, conversational voice, \
as a thoughtful friend would talk it through, while keeping the verdict line and the structure unchanged.";

static HUMANIZED_PROMPT: Lazy<String> =
    Lazy::new(|| format!("{} {}", BASE_PROMPT, HUMANIZE_DIRECTIVE));

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptOptions {
    pub humanized: bool,
}

pub fn system_prompt(options: &PromptOptions) -> &'static str {
    if options.humanized {
        HUMANIZED_PROMPT.as_str()
    } else {
        BASE_PROMPT
    }
}

/// Exactly two turns: the static instruction, then the sanitized post.
pub fn build_messages(options: &PromptOptions, post: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(system_prompt(options)),
        ChatMessage::user(post),
    ]
}
