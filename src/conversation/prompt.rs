//! Llama-2 chat prompt rendering shared by every generation backend.

use crate::conversation::ConversationWindow;
use crate::Role;

/// Directive appended to a window to ask the model to keep going.
pub const CONTINUE_DIRECTIVE: &str = "[INST] Continue response [/INST]";

const BOS: &str = "<s>";
const EOS: &str = "</s>";

/// Render a system instruction, a window and an optional directive.
///
/// Consecutive user messages share one `[INST]` block. A bot message closes
/// the open block and ends its turn with `</s>`. The directive is appended
/// verbatim after the window, reopening a sequence if the last turn was closed.
pub fn render_prompt(
    system_prompt: &str,
    window: &ConversationWindow,
    directive: Option<&str>,
) -> String {
    let mut prompt = format!("{BOS}[INST] <<SYS>>\n{}\n<</SYS>>\n\n", system_prompt.trim());
    let mut instruction_open = true;
    let mut instruction_has_text = false;

    for message in window.messages() {
        match message.role() {
            Role::User => {
                if !instruction_open {
                    prompt.push_str(BOS);
                    prompt.push_str("[INST] ");
                    instruction_open = true;
                } else if instruction_has_text {
                    prompt.push('\n');
                }
                prompt.push_str(message.content().trim());
                instruction_has_text = true;
            }
            Role::Bot => {
                if instruction_open {
                    prompt.push_str(" [/INST]");
                    instruction_open = false;
                    instruction_has_text = false;
                }
                prompt.push(' ');
                prompt.push_str(message.content().trim());
                prompt.push(' ');
                prompt.push_str(EOS);
            }
        }
    }

    if instruction_open {
        prompt.push_str(" [/INST]");
        instruction_open = false;
    }

    if let Some(directive) = directive {
        if !instruction_open && prompt.ends_with(EOS) {
            prompt.push_str(BOS);
        } else {
            prompt.push(' ');
        }
        prompt.push_str(directive);
    }

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Message;
    use indoc::indoc;

    fn window(messages: Vec<Message>) -> ConversationWindow {
        messages.into()
    }

    #[test]
    fn renders_alternating_turns() {
        let prompt = render_prompt(
            "Be nice.",
            &window(vec![
                Message::user("hi"),
                Message::bot("hello"),
                Message::user("how are you?"),
            ]),
            None,
        );

        let expected = indoc! {"
            <s>[INST] <<SYS>>
            Be nice.
            <</SYS>>

            hi [/INST] hello </s><s>[INST] how are you? [/INST]"};
        assert_eq!(prompt, expected);
    }

    #[test]
    fn joins_consecutive_user_messages() {
        let prompt = render_prompt(
            "sys",
            &window(vec![Message::user("first"), Message::user("second")]),
            None,
        );
        assert!(prompt.ends_with("first\nsecond [/INST]"));
    }

    #[test]
    fn leading_bot_message_closes_the_system_block() {
        let prompt = render_prompt("sys", &window(vec![Message::bot("welcome")]), None);
        assert_eq!(prompt, "<s>[INST] <<SYS>>\nsys\n<</SYS>>\n\n [/INST] welcome </s>");
    }

    #[test]
    fn continue_directive_follows_a_closed_bot_turn() {
        let conversation = window(vec![Message::user("hi"), Message::bot("hello")]);
        let prompt = render_prompt("sys", &conversation, Some(CONTINUE_DIRECTIVE));

        assert!(prompt.ends_with("hi [/INST] hello </s><s>[INST] Continue response [/INST]"));
        // The window is untouched by the directive.
        assert_eq!(conversation.len(), 2);
        assert_eq!(
            render_prompt("sys", &conversation, None),
            prompt.trim_end_matches("<s>[INST] Continue response [/INST]")
        );
    }

    #[test]
    fn empty_window_still_carries_the_system_prompt() {
        let prompt = render_prompt("  sys  ", &ConversationWindow::default(), None);
        assert_eq!(prompt, "<s>[INST] <<SYS>>\nsys\n<</SYS>>\n\n [/INST]");
    }
}
