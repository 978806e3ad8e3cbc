use df_core::ConversationTurn;
use df_parser::GraphDocument;

pub const SYSTEM_PROMPT: &str = "You are a control flow graph generator assistant.
Generate DOT graph code that follows these rules:
1. Use proper 'digraph G {...}' structure
2. Include clear node labels
3. Use -> for directed edges
4. Add appropriate edge labels for conditions
5. Maintain consistent formatting";

const RESPONSE_REQUIREMENTS: &str = "Include in your response:
1. A clear explanation of the process flow
2. The complete DOT graph code
3. Ensure all nodes are connected
4. Use descriptive edge labels";

/// Messages for a fresh graph: system prompt, the last `window` turns of
/// history, then the request.
#[must_use]
pub fn generation_messages(
    history: &[ConversationTurn],
    window: usize,
    user_input: &str,
) -> Vec<ConversationTurn> {
    let prompt = format!("Create a control flow graph for: {user_input}\n\n{RESPONSE_REQUIREMENTS}");
    assemble(history, window, prompt)
}

/// Messages asking for an improved version of `current`, which is embedded
/// verbatim.
#[must_use]
pub fn repair_messages(
    history: &[ConversationTurn],
    window: usize,
    current: &GraphDocument,
    feedback: &str,
) -> Vec<ConversationTurn> {
    let prompt = format!(
        "Improve the existing graph for: {feedback}\n\nCurrent graph:\n```dot\n{}\n```\n\n{RESPONSE_REQUIREMENTS}",
        current.as_str()
    );
    assemble(history, window, prompt)
}

fn assemble(history: &[ConversationTurn], window: usize, prompt: String) -> Vec<ConversationTurn> {
    let recent = &history[history.len().saturating_sub(window)..];
    let mut messages = Vec::with_capacity(recent.len() + 2);
    messages.push(ConversationTurn::system(SYSTEM_PROMPT));
    messages.extend(recent.iter().cloned());
    messages.push(ConversationTurn::user(prompt));
    messages
}
