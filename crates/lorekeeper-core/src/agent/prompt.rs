//! Prompt assembly for the planning and synthesis calls.

use serde_json::Value;

use lorekeeper_types::tool::{ContextField, ToolInvocation, ToolOutcome};

const PLANNING_PROMPT: &str = "You are the planning step of a tabletop RPG campaign assistant. \
Decide which tools, if any, are needed to answer the player's latest message. \
Call search_campaign or get_file_content for facts about the campaign, roll_dice for any \
dice roll the player asks for, and get_conversation_history when the message refers to \
something said earlier. If the gathered results already answer the message, call no tools.";

const SYNTHESIS_PROMPT: &str = "You are a knowledgeable, creative game-master's assistant for a \
tabletop RPG campaign. Answer the player using the campaign material and tool results \
provided. Stay consistent with established lore, say so when the material does not cover \
something, and report dice results exactly as rolled.";

const FINAL_ANSWER_NOTE: &str =
    "Provide your final answer based on the information gathered. Do not ask for more tools.";

pub fn planning_system_prompt(background: &str) -> String {
    with_background(PLANNING_PROMPT, background)
}

pub fn synthesis_system_prompt(background: &str) -> String {
    with_background(SYNTHESIS_PROMPT, background)
}

fn with_background(base: &str, background: &str) -> String {
    if background.trim().is_empty() {
        return base.to_string();
    }
    format!("{base}\n\n<campaign_background>\n{}\n</campaign_background>", background.trim())
}

/// The player's message followed by the results gathered so far.
///
/// `bound_reached` adds an instruction to answer with what is available.
pub fn user_message_with_results(
    message: &str,
    results: &[ToolInvocation],
    bound_reached: bool,
) -> String {
    let mut content = message.to_string();
    if !results.is_empty() {
        content.push_str("\n\n");
        content.push_str(&build_tool_results_block(results));
    }
    if bound_reached {
        content.push_str("\n\n");
        content.push_str(FINAL_ANSWER_NOTE);
    }
    content
}

/// Produces an XML `<tool_results>` block, one `<result>` per invocation.
pub fn build_tool_results_block(results: &[ToolInvocation]) -> String {
    let mut xml = String::from("<tool_results>\n");

    for result in results {
        let status = match result.outcome {
            ToolOutcome::Success(_) => "ok",
            ToolOutcome::Error(_) => "error",
        };
        xml.push_str(&format!(
            "  <result tool=\"{}\" args=\"{}\" status=\"{status}\">\n",
            escape_xml(&result.name),
            escape_xml(&render_args(&result.arguments)),
        ));
        xml.push_str(&format!("    {}\n", escape_xml(result.outcome.text().trim())));
        xml.push_str("  </result>\n");
    }

    xml.push_str("</tool_results>");
    xml
}

/// Markdown footer listing the tools used this turn. Streamed to the client
/// but never persisted.
pub fn tools_footer(results: &[ToolInvocation]) -> Option<String> {
    if results.is_empty() {
        return None;
    }
    let calls = results
        .iter()
        .map(|r| format!("{}({})", r.name, render_args(&r.arguments)))
        .collect::<Vec<_>>()
        .join(", ");
    Some(format!("\n\n---\n*Tools used: {calls}*"))
}

/// `key=value` pairs of model-declared arguments, without context fields.
fn render_args(arguments: &Value) -> String {
    let Some(map) = arguments.as_object() else {
        return String::new();
    };
    let context_keys = [
        ContextField::UserId.key(),
        ContextField::Campaign.key(),
        ContextField::SessionId.key(),
    ];
    map.iter()
        .filter(|(key, _)| !context_keys.contains(&key.as_str()))
        .map(|(key, value)| match value {
            Value::String(s) => format!("{key}={s}"),
            other => format!("{key}={other}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
