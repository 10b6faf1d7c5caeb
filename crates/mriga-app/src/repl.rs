//! Line-oriented presentation: command parsing, themes, and incremental
//! rendering of conversation snapshots.

use mriga_chat::{ConversationSnapshot, ConversationStatus};
use mriga_core::types::{InteractionMode, Speaker, VoiceGender};

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Plain text: an utterance while the mic is on, otherwise a message.
    Say(String),
    Voice,
    Text,
    Back,
    Mic,
    Personas,
    Persona(String),
    New,
    Theme,
    Help,
    Quit,
    Unknown(String),
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Say(line.to_string());
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    match name.to_ascii_lowercase().as_str() {
        "voice" => Command::Voice,
        "text" => Command::Text,
        "back" => Command::Back,
        "mic" => Command::Mic,
        "personas" => Command::Personas,
        "persona" if !arg.is_empty() => Command::Persona(arg.to_string()),
        "new" => Command::New,
        "theme" => Command::Theme,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// Gender answer from the persona form. Blank or unrecognised input leaves
/// the default (male) to the registry.
pub fn parse_gender(input: &str) -> Option<VoiceGender> {
    match input.trim().to_ascii_lowercase().as_str() {
        "f" | "female" => Some(VoiceGender::Female),
        "m" | "male" => Some(VoiceGender::Male),
        _ => None,
    }
}

pub const HELP: &str = "\
Commands:
  /voice            start a voice conversation (/mic to talk)
  /text             start a text conversation
  /back             leave the conversation
  /mic              turn the microphone on or off
  /personas         list personalities
  /persona <name>   talk to someone else
  /new              create a custom personality
  /theme            switch colour theme
  /quit             exit
Anything else is sent as a message (or heard, while the mic is on).";

/// Colour themes, cycled in this order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    DeepSpace,
    Light,
    Dark,
    Ocean,
    Sunset,
}

impl Theme {
    const ALL: [Theme; 5] = [Theme::DeepSpace, Theme::Light, Theme::Dark, Theme::Ocean, Theme::Sunset];

    /// Unknown keys fall back to the default theme.
    pub fn from_key(key: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.key().eq_ignore_ascii_case(key.trim()))
            .unwrap_or_default()
    }

    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|t| *t == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn key(self) -> &'static str {
        match self {
            Theme::DeepSpace => "deep-space",
            Theme::Light => "light",
            Theme::Dark => "dark",
            Theme::Ocean => "ocean",
            Theme::Sunset => "sunset",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Theme::DeepSpace => "Deep Space",
            Theme::Light => "Light",
            Theme::Dark => "Dark",
            Theme::Ocean => "Ocean",
            Theme::Sunset => "Sunset",
        }
    }

    /// ANSI colours for (user, assistant) prefixes.
    fn colours(self) -> (&'static str, &'static str) {
        match self {
            Theme::DeepSpace => ("\x1b[36m", "\x1b[35m"),
            Theme::Light => ("\x1b[34m", "\x1b[30m"),
            Theme::Dark => ("\x1b[37m", "\x1b[90m"),
            Theme::Ocean => ("\x1b[96m", "\x1b[94m"),
            Theme::Sunset => ("\x1b[33m", "\x1b[31m"),
        }
    }
}

const RESET: &str = "\x1b[0m";

/// Turns successive snapshots into terminal output, printing only what
/// changed since the previous call.
#[derive(Debug)]
pub struct Renderer {
    theme: Theme,
    colour: bool,
    show_status: bool,
    mode: InteractionMode,
    status: ConversationStatus,
    selected: String,
    notice: Option<String>,
    /// Messages fully written out.
    printed: usize,
    /// Text already written for the message after `printed`.
    partial: String,
}

impl Renderer {
    pub fn new(theme: Theme, show_status: bool) -> Self {
        Self {
            theme,
            colour: true,
            show_status,
            mode: InteractionMode::Landing,
            status: ConversationStatus::Idle,
            selected: String::new(),
            notice: None,
            printed: 0,
            partial: String::new(),
        }
    }

    /// Plain output without escape codes.
    pub fn without_colour(mut self) -> Self {
        self.colour = false;
        self
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn render(&mut self, snap: &ConversationSnapshot) -> String {
        let mut out = String::new();

        if snap.mode != self.mode {
            self.close_partial(&mut out);
            out.push_str(&mode_banner(snap));
            self.mode = snap.mode;
        }
        if snap.selected.name != self.selected {
            if snap.mode != InteractionMode::Landing && !self.selected.is_empty() {
                self.close_partial(&mut out);
                out.push_str(&format!("* now talking to {}\n", snap.selected.name));
            }
            // A new personality always starts a fresh transcript.
            self.printed = 0;
            self.selected = snap.selected.name.clone();
        }

        if snap.transcript.len() < self.printed {
            self.close_partial(&mut out);
            self.printed = 0;
        }
        let len = snap.transcript.len();
        for (index, message) in snap.transcript.iter().enumerate().skip(self.printed) {
            let open = index + 1 == len
                && message.speaker == Speaker::Assistant
                && snap.status == ConversationStatus::Thinking;
            if open && message.text.is_empty() && self.partial.is_empty() {
                break;
            }

            match message.text.strip_prefix(self.partial.as_str()) {
                Some(rest) if !self.partial.is_empty() => out.push_str(rest),
                _ => {
                    if !self.partial.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&self.prefix(message.speaker, &snap.selected.name));
                    out.push_str(&message.text);
                }
            }

            if open {
                self.partial = message.text.clone();
                break;
            }
            out.push('\n');
            self.partial.clear();
            self.printed = index + 1;
        }

        if snap.status != self.status {
            if self.show_status && self.partial.is_empty() {
                out.push_str(&format!("  [{}]\n", status_label(snap.status)));
            }
            self.status = snap.status;
        }

        if snap.notice != self.notice {
            if let Some(ref notice) = snap.notice {
                self.close_partial(&mut out);
                out.push_str(&format!("! {notice}\n"));
            }
            self.notice = snap.notice.clone();
        }

        out
    }

    fn close_partial(&mut self, out: &mut String) {
        if !self.partial.is_empty() {
            out.push('\n');
            self.partial.clear();
            self.printed += 1;
        }
    }

    fn prefix(&self, speaker: Speaker, persona: &str) -> String {
        let (user, assistant) = self.theme.colours();
        let (colour, label) = match speaker {
            Speaker::User => (user, "you"),
            Speaker::Assistant => (assistant, persona),
        };
        if self.colour {
            format!("{colour}{label}>{RESET} ")
        } else {
            format!("{label}> ")
        }
    }
}

fn mode_banner(snap: &ConversationSnapshot) -> String {
    match snap.mode {
        InteractionMode::Landing => "\nChoose /voice or /text to start talking.\n".to_string(),
        InteractionMode::Voice => {
            let mut banner = format!("\n== Voice chat with {} ==\n", snap.selected.name);
            if !snap.recognition_supported {
                banner.push_str("(speech recognition is unavailable; type your messages)\n");
            }
            if !snap.synthesis_supported {
                banner.push_str("(speech synthesis is unavailable; replies are shown only)\n");
            }
            banner.push_str("Use /mic to start talking.\n");
            banner
        }
        InteractionMode::Text => format!("\n== Text chat with {} ==\n", snap.selected.name),
    }
}

fn status_label(status: ConversationStatus) -> &'static str {
    match status {
        ConversationStatus::Idle => "ready",
        ConversationStatus::Listening => "listening...",
        ConversationStatus::Thinking => "thinking...",
        ConversationStatus::Speaking => "speaking...",
    }
}

/// One line per personality, marking the selected one.
pub fn personality_list(snap: &ConversationSnapshot) -> String {
    snap.personalities
        .iter()
        .map(|p| {
            let marker = if p.name == snap.selected.name { "*" } else { " " };
            let gender = p.gender.map(|g| format!(" ({g})")).unwrap_or_default();
            format!("{marker} {}{gender}\n", p.name)
        })
        .collect()
}
