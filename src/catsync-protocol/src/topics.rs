// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Topic naming: `<station>/radios/<radio>/cat/<leaf>`.

/// The leaf of a radio's topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicKind {
    SetState,
    State,
    Caps,
    Status,
    Ping,
    Pong,
    Log,
}

impl TopicKind {
    pub const ALL: [TopicKind; 7] = [
        TopicKind::SetState,
        TopicKind::State,
        TopicKind::Caps,
        TopicKind::Status,
        TopicKind::Ping,
        TopicKind::Pong,
        TopicKind::Log,
    ];

    pub fn leaf(self) -> &'static str {
        match self {
            TopicKind::SetState => "setstate",
            TopicKind::State => "state",
            TopicKind::Caps => "caps",
            TopicKind::Status => "status",
            TopicKind::Ping => "ping",
            TopicKind::Pong => "pong",
            TopicKind::Log => "log",
        }
    }
}

/// Topic names for one radio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(station: &str, radio: &str) -> Self {
        Self {
            prefix: format!("{}/radios/{}/cat", station, radio),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topic(&self, kind: TopicKind) -> String {
        format!("{}/{}", self.prefix, kind.leaf())
    }

    pub fn setstate(&self) -> String {
        self.topic(TopicKind::SetState)
    }

    pub fn state(&self) -> String {
        self.topic(TopicKind::State)
    }

    pub fn caps(&self) -> String {
        self.topic(TopicKind::Caps)
    }

    pub fn status(&self) -> String {
        self.topic(TopicKind::Status)
    }

    pub fn ping(&self) -> String {
        self.topic(TopicKind::Ping)
    }

    pub fn pong(&self) -> String {
        self.topic(TopicKind::Pong)
    }

    pub fn log(&self) -> String {
        self.topic(TopicKind::Log)
    }

    /// Filter matching every topic of this radio.
    pub fn all(&self) -> String {
        format!("{}/#", self.prefix)
    }

    /// Map a concrete topic back to its kind, if it belongs to this radio.
    pub fn classify(&self, topic: &str) -> Option<TopicKind> {
        let leaf = topic.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        TopicKind::ALL.into_iter().find(|k| k.leaf() == leaf)
    }
}
