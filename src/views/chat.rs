use crate::presentation::{self, BubbleBody, DateGroupView, MessageView};
use crate::scroll::ScrollMetrics;
use crate::session::{ChatSession, ChatSnapshot};
use dioxus::prelude::*;

const CHAT_LIST_ID: &str = "chat-list";

const SCROLL_TO_BOTTOM_JS: &str = r#"
    const el = document.getElementById("chat-list");
    if (el) { el.scrollTo({ top: el.scrollHeight, behavior: "smooth" }); }
    return true;
"#;

const READ_METRICS_JS: &str = r#"
    const el = document.getElementById("chat-list");
    if (!el) { return [0, 0, 0]; }
    return [el.scrollTop, el.scrollHeight, el.clientHeight];
"#;

#[component]
pub fn ChatView(snapshot: Signal<ChatSnapshot>) -> Element {
    let session = use_context::<ChatSession>();

    use_effect({
        let session = session.clone();
        move || {
            if snapshot.read().should_scroll_to_bottom {
                let session = session.clone();
                spawn(async move {
                    let _ = document::eval(SCROLL_TO_BOTTOM_JS).await;
                    session.scroll_completed();
                });
            }
        }
    });

    let on_scroll = {
        let session = session.clone();
        move |_| {
            let session = session.clone();
            spawn(async move {
                if let Ok([scroll_top, scroll_height, client_height]) =
                    document::eval(READ_METRICS_JS).join::<[f64; 3]>().await
                {
                    session.on_scroll(ScrollMetrics {
                        scroll_top,
                        scroll_height,
                        client_height,
                    });
                }
            });
        }
    };

    let current = snapshot.read();
    let groups = presentation::present(&current.groups);
    let show_loading = current.loading && current.messages.is_empty();
    let show_empty = !current.loading && current.is_empty();
    let show_jump = current.pending_indicator_visible;

    rsx! {
        div { class: "chat-wrap",
            div { id: CHAT_LIST_ID, class: "chat-list", onscroll: on_scroll,
                if show_loading {
                    div { class: "chat-placeholder",
                        span { class: "shimmer-text", "Loading messages\u{2026}" }
                    }
                } else if show_empty {
                    div { class: "chat-placeholder", "No messages yet" }
                }
                for group in groups {
                    DateSection { key: "{group.key}", group }
                }
            }
            if show_jump {
                button {
                    class: "jump-latest", r#type: "button",
                    aria_label: "Jump to latest message",
                    onclick: move |_| {
                        session.jump_to_latest();
                    },
                    "\u{2193} New messages"
                }
            }
        }
    }
}

#[component]
fn DateSection(group: DateGroupView) -> Element {
    rsx! {
        div { class: "date-divider",
            span { "{group.label}" }
        }
        for message in group.messages {
            Bubble { key: "{message.key}", message }
        }
    }
}

#[component]
fn Bubble(message: MessageView) -> Element {
    let side = message.side.css_class();
    let body = match &message.body {
        BubbleBody::Text(text) => rsx! { span { class: "bubble-text", "{text}" } },
        BubbleBody::ToolCall { label } => rsx! {
            span { class: "tool-tag", "\u{1f527} {label}" }
        },
    };
    rsx! {
        div { class: format_args!("message-row {}", side),
            div { class: format_args!("bubble {}{}", side, if message.is_temp { " temp" } else { "" }),
                {body}
                div { class: "message-meta",
                    span { class: "message-timestamp", "{message.time_label}" }
                    if let Some(status) = message.status {
                        span { class: status.css_class(), "{status.symbol()}" }
                    }
                }
            }
        }
    }
}
