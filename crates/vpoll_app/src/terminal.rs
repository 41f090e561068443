//! Maps the terminal onto the page the controller expects: stdin lines stand
//! in for visibility changes and DOM events, and a reload ends the session.
use tokio::sync::mpsc;
use vpoll_core::Visibility;
use vpoll_engine::PageHost;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Visibility(Visibility),
    Reload,
    Dismiss,
    Status,
    Quit,
    /// Any other word fires the event of that name.
    Event(String),
}

pub fn parse_input(line: &str) -> Option<Input> {
    let word = line.trim();
    let input = match word.to_ascii_lowercase().as_str() {
        "" => return None,
        "hide" | "hidden" => Input::Visibility(Visibility::Hidden),
        "show" | "visible" => Input::Visibility(Visibility::Visible),
        "reload" | "y" | "yes" => Input::Reload,
        "dismiss" | "n" | "no" | "later" => Input::Dismiss,
        "status" => Input::Status,
        "quit" | "q" | "exit" => Input::Quit,
        _ => Input::Event(word.to_string()),
    };
    Some(input)
}

/// A page whose reload is a request to exit the host loop.
pub struct TerminalPage {
    reloads: mpsc::UnboundedSender<()>,
}

impl TerminalPage {
    pub fn new(reloads: mpsc::UnboundedSender<()>) -> Self {
        Self { reloads }
    }
}

impl PageHost for TerminalPage {
    fn reload(&self) {
        let _ = self.reloads.send(());
    }
}
