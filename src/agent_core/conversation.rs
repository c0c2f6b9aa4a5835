//! Conversation history for one query.
//!
//! Responsibilities:
//! - Hold the ordered, append-only message history of a `process_query` call
//! - Correlate tool results with the invocation requests that produced them
//! - Build `Vec<ChatMessage>` for the inference client

use crate::inference::types::{ChatMessage, FunctionCallResponse, Role, ToolCallResponse};

use super::completion::{Invocation, ToolArguments};

// ─── ConversationMessage ────────────────────────────────────────────────────

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationMessage {
    /// Text typed by the user.
    UserText(String),
    /// Text produced by the model.
    AssistantText(String),
    /// The model asked for a tool to be invoked.
    AssistantInvocation {
        request_id: String,
        name: String,
        arguments: ToolArguments,
    },
    /// The outcome of an invocation, correlated by `request_id`.
    ToolResult {
        request_id: String,
        content: String,
        is_error: bool,
    },
}

// ─── Conversation ───────────────────────────────────────────────────────────

/// Append-only message history.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ConversationMessage>,
}

impl Conversation {
    /// A history seeded with one user message.
    pub fn seeded(user_text: &str) -> Self {
        let mut conversation = Self::default();
        conversation.add_user_message(user_text);
        conversation
    }

    pub fn add_user_message(&mut self, text: &str) {
        self.messages
            .push(ConversationMessage::UserText(text.to_string()));
    }

    pub fn add_assistant_message(&mut self, text: &str) {
        self.messages
            .push(ConversationMessage::AssistantText(text.to_string()));
    }

    pub fn add_invocation_message(&mut self, invocation: &Invocation) {
        self.messages.push(ConversationMessage::AssistantInvocation {
            request_id: invocation.request_id.clone(),
            name: invocation.qualified_name.clone(),
            arguments: invocation.arguments.clone(),
        });
    }

    pub fn add_tool_result_message(&mut self, request_id: &str, content: String, is_error: bool) {
        self.messages.push(ConversationMessage::ToolResult {
            request_id: request_id.to_string(),
            content,
            is_error,
        });
    }

    /// Every message, in append order.
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Position and content of the tool result for `request_id`.
    pub fn find_result(&self, request_id: &str) -> Option<(usize, &str)> {
        self.messages.iter().enumerate().find_map(|(i, msg)| match msg {
            ConversationMessage::ToolResult {
                request_id: id,
                content,
                ..
            } if id == request_id => Some((i, content.as_str())),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

// ─── Chat Message Mapping ───────────────────────────────────────────────────

/// Build the `Vec<ChatMessage>` to send to the inference client.
///
/// The system prompt (if any) comes first. Each invocation request becomes
/// an assistant message carrying exactly one tool call.
pub fn build_chat_messages(
    history: &[ConversationMessage],
    system_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut chat_messages = Vec::with_capacity(history.len() + 1);

    if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
        chat_messages.push(ChatMessage {
            role: Role::System,
            content: Some(prompt.to_string()),
            tool_call_id: None,
            tool_calls: None,
        });
    }

    for msg in history {
        let chat = match msg {
            ConversationMessage::UserText(text) => ChatMessage {
                role: Role::User,
                content: Some(text.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            ConversationMessage::AssistantText(text) => ChatMessage {
                role: Role::Assistant,
                content: Some(text.clone()),
                tool_call_id: None,
                tool_calls: None,
            },
            ConversationMessage::AssistantInvocation {
                request_id,
                name,
                arguments,
            } => ChatMessage {
                role: Role::Assistant,
                content: None,
                tool_call_id: None,
                tool_calls: Some(vec![ToolCallResponse {
                    id: request_id.clone(),
                    r#type: "function".to_string(),
                    function: FunctionCallResponse {
                        name: name.clone(),
                        arguments: arguments.to_wire(),
                    },
                }]),
            },
            ConversationMessage::ToolResult {
                request_id,
                content,
                ..
            } => ChatMessage {
                role: Role::Tool,
                content: Some(content.clone()),
                tool_call_id: Some(request_id.clone()),
                tool_calls: None,
            },
        };
        chat_messages.push(chat);
    }

    chat_messages
}

// ─── Tests ──────────────────────────────────────────────────────────────────
