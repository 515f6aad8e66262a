//! Prompt construction for the answer and follow-up calls

use crate::content;
use crate::llm::ChatMessage;
use crate::models::{Role, Source, TurnRequest};

/// Follow-up questions kept at most
pub const MAX_FOLLOWUPS: usize = 5;

/// Answer prefix shown to the follow-up generator
const ANSWER_PREVIEW_CHARS: usize = 500;

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

const CITATION_RULES: &str = "\
- Include citations inline as [1], [2], etc. when referencing specific sources
- Citations should correspond to the source order (first source = [1], second = [2], etc.)
- Use the format [1] not CITATION_1 or any other format";

const NUMBER_RULES: &str = "\
CRITICAL FORMATTING RULE:
- NEVER use LaTeX/math syntax ($...$) for regular numbers in your response
- Write ALL numbers as plain text: \"1 million\" NOT \"$1$ million\", \"50%\" NOT \"$50\\%$\"
- Only use math syntax for actual mathematical equations if absolutely necessary";

fn first_query_system() -> String {
    format!(
        "You are a friendly assistant that helps users find information.\n\n\
         {NUMBER_RULES}\n\n\
         RESPONSE STYLE:\n\
         - For greetings (hi, hello), respond warmly and ask how you can help\n\
         - For simple questions, give direct, concise answers\n\
         - For complex topics, provide detailed explanations only when needed\n\
         - Match the user's energy level - be brief if they're brief\n\n\
         FORMAT:\n\
         - Use markdown for readability when appropriate\n\
         - Keep responses natural and conversational\n\
         {CITATION_RULES}"
    )
}

fn follow_up_system() -> String {
    format!(
        "You are a friendly assistant continuing our conversation.\n\n\
         {NUMBER_RULES}\n\n\
         REMEMBER:\n\
         - Keep the same conversational tone from before\n\
         - Build on previous context naturally\n\
         - Match the user's communication style\n\
         - Use markdown when it helps clarity\n\
         {CITATION_RULES}"
    )
}

fn followup_system(is_follow_up: bool) -> String {
    let mut prompt = String::from(
        "Generate 5 natural follow-up questions based on the query and answer.\n\n\
         ONLY generate questions if the query warrants them:\n\
         - Skip for simple greetings or basic acknowledgments\n\
         - Create questions that feel natural, not forced\n\
         - Make them genuinely helpful, not just filler\n\
         - Focus on the topic and sources available\n\n\
         If the query doesn't need follow-ups, return an empty response.\n",
    );
    if is_follow_up {
        prompt.push_str(
            "Consider the full conversation history and avoid repeating previous questions.\n",
        );
    }
    prompt.push_str("Return only the questions, one per line, no numbering or bullets.");
    prompt
}

/// Numbered context blocks, one per source, each excerpt capped at `max_chars`.
pub fn build_context(sources: &[Source], query: &str, max_chars: usize) -> String {
    sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            let excerpt = content::select(source.body(), query, max_chars);
            format!("[{}] {}\nURL: {}\n{}", i + 1, source.title, source.url, excerpt)
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

fn answer_request(query: &str, context: &str) -> String {
    format!(
        "Answer this query: \"{}\"\n\nBased on these sources:\n{}",
        query, context
    )
}

fn history_message(role: Role, text: &str) -> ChatMessage {
    match role {
        Role::User => ChatMessage::user(text),
        Role::Assistant => ChatMessage::assistant(text),
    }
}

/// Message list for the streamed answer. Follow-up turns replay prior
/// messages verbatim between the system prompt and the new request.
pub fn answer_messages(request: &TurnRequest, context: &str) -> Vec<ChatMessage> {
    let system = if request.is_follow_up() {
        follow_up_system()
    } else {
        first_query_system()
    };

    let mut messages = vec![ChatMessage::system(system)];
    messages.extend(
        request
            .history
            .iter()
            .map(|m| history_message(m.role, &m.text)),
    );
    messages.push(ChatMessage::user(answer_request(&request.query, context)));
    messages
}

/// Message list for follow-up generation. `answer` is absent when the call
/// runs alongside the answer stream.
pub fn followup_messages(
    request: &TurnRequest,
    answer: Option<&str>,
    source_titles: &[String],
) -> Vec<ChatMessage> {
    let mut user = String::new();

    if request.is_follow_up() {
        user.push_str("Conversation so far:\n");
        for m in &request.history {
            user.push_str(&format!("{}: {}\n\n", m.role, m.text));
        }
    }

    user.push_str(&format!("Query: {}\n\n", request.query));

    if let Some(answer) = answer {
        let preview: String = answer.chars().take(ANSWER_PREVIEW_CHARS).collect();
        user.push_str(&format!("Answer provided: {}...\n\n", preview));
    }

    if !source_titles.is_empty() {
        user.push_str(&format!(
            "Available sources about: {}\n\n",
            source_titles.join(", ")
        ));
    }

    user.push_str(
        "Generate 5 diverse follow-up questions that would help the user learn more about this topic from different angles.",
    );

    vec![
        ChatMessage::system(followup_system(request.is_follow_up())),
        ChatMessage::user(user),
    ]
}

/// One question per line, blanks dropped, at most five.
pub fn parse_followups(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .take(MAX_FOLLOWUPS)
        .map(str::to_string)
        .collect()
}
