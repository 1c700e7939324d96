use crate::session::{ChatSession, ChatSnapshot};
use crate::store::Banner;
use crate::views::{ChatView, Composer};
use dioxus::prelude::*;

const CHAT_CSS: Asset = asset!("/assets/chat.css");

#[component]
pub fn App() -> Element {
    let session = use_context::<ChatSession>();
    let snapshot = use_snapshot(session.clone());

    use_hook({
        let session = session.clone();
        move || session.mount()
    });
    use_drop({
        let session = session.clone();
        move || session.unmount()
    });

    let current = snapshot();
    rsx! {
        document::Link { rel: "stylesheet", href: CHAT_CSS }
        div { class: "app-shell",
            ChatHeader { connected: !current.connection_failed }
            if let Some(banner) = current.banner {
                ErrorBanner { banner }
            }
            ChatView { snapshot }
            Composer { disabled: current.input_disabled, disconnected: current.connection_failed }
        }
    }
}

/// Mirrors the session's watch channel into a signal.
fn use_snapshot(session: ChatSession) -> Signal<ChatSnapshot> {
    let mut snapshot = use_signal(|| session.snapshot());
    use_future(move || {
        let mut updates = session.subscribe();
        async move {
            while updates.changed().await.is_ok() {
                let next = updates.borrow_and_update().clone();
                snapshot.set(next);
            }
        }
    });
    snapshot
}

#[component]
fn ChatHeader(connected: bool) -> Element {
    let session = use_context::<ChatSession>();
    let mut menu_open = use_signal(|| false);
    let (badge_class, badge_label) = if connected {
        ("badge online", "Connected")
    } else {
        ("badge offline", "Disconnected")
    };

    let on_refresh = {
        let session = session.clone();
        move |_| {
            menu_open.set(false);
            let session = session.clone();
            spawn(async move {
                session.refresh().await;
            });
        }
    };
    let on_clear = move |_| {
        menu_open.set(false);
        session.clear();
    };

    rsx! {
        div { class: "header",
            div { class: "header-content",
                div { class: "avatar", "T" }
                div { class: "header-title",
                    h1 { "Twiga" }
                    span { class: badge_class, "{badge_label}" }
                }
                div { class: "menu",
                    button {
                        class: "btn btn-ghost", r#type: "button",
                        aria_label: "Chat options",
                        onclick: move |_| menu_open.set(!menu_open()),
                        "\u{22ee}"
                    }
                    if menu_open() {
                        div { class: "menu-popover",
                            button { class: "menu-item", r#type: "button", onclick: on_refresh, "Refresh" }
                            button { class: "menu-item", r#type: "button", onclick: on_clear, "Clear chat" }
                        }
                    }
                }
            }
        }
    }
}

#[component]
fn ErrorBanner(banner: Banner) -> Element {
    let session = use_context::<ChatSession>();
    rsx! {
        div { class: "error-banner", role: "alert",
            span { "{banner.text()}" }
            if banner == Banner::FetchFailed {
                button {
                    class: "btn btn-ghost", r#type: "button",
                    aria_label: "Dismiss",
                    onclick: move |_| session.dismiss_error(),
                    "\u{00d7}"
                }
            }
        }
    }
}
