use crate::session::ChatSession;
use dioxus::events::Key;
use dioxus::prelude::*;
use tracing::debug;

const PLACEHOLDER: &str = "Type a message";
const DISCONNECTED_PLACEHOLDER: &str = "Database connection required to send messages";

#[component]
pub fn Composer(disabled: bool, disconnected: bool) -> Element {
    let session = use_context::<ChatSession>();
    let mut input = use_signal(String::new);

    let submit = use_callback(move |()| {
        let text = input();
        if text.trim().is_empty() {
            return;
        }
        input.set(String::new());
        let session = session.clone();
        spawn(async move {
            if let Err(rejected) = session.send_message(&text).await {
                debug!("message not sent: {rejected}");
                // Hand the text back unless the user already started a new one.
                if rejected.keeps_draft() && input.peek().is_empty() {
                    input.set(text);
                }
            }
        });
    });

    let placeholder = if disconnected {
        DISCONNECTED_PLACEHOLDER
    } else {
        PLACEHOLDER
    };

    rsx! {
        form { class: "composer",
            onsubmit: move |ev| ev.prevent_default(),
            div { class: "composer-inner",
                input {
                    r#type: "text",
                    placeholder,
                    value: "{input}",
                    disabled,
                    oninput: move |ev| input.set(ev.value()),
                    onkeydown: move |ev| {
                        if ev.key() == Key::Enter && !ev.modifiers().shift() {
                            ev.prevent_default();
                            submit.call(());
                        }
                    },
                }
                button {
                    class: "btn btn-primary", r#type: "button",
                    disabled: disabled || input().trim().is_empty(),
                    onclick: move |_| submit.call(()),
                    "Send"
                }
            }
        }
    }
}
