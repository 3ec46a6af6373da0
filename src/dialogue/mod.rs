//! Voice dialogue: turn-taking controller and utterance classification.

pub mod classify;
pub mod controller;

pub use classify::{Reply, Topic, classify};
pub use controller::{
    DialogueController, DialogueEvent, DialogueHandle, DialogueNotice, DialogueSnapshot,
    DialogueState, NoticeKind, Severity,
};
