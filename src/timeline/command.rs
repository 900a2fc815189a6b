//! Command queue for steering a player from the outside.
//!
//! Any collaborator holding a [CommandSender] can post; the player drains the
//! queue synchronously at the top of its next `update`.

use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerCommand {
    RequestFrameJump(u32),
    RequestStop,
    RequestPause,
    RequestResume,
}

#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<PlayerCommand>,
}

impl CommandSender {
    /// Returns false once the owning player has been dropped.
    pub fn post(&self, command: PlayerCommand) -> bool {
        self.tx.send(command).is_ok()
    }

    pub fn request_frame_jump(&self, frame: u32) -> bool {
        self.post(PlayerCommand::RequestFrameJump(frame))
    }

    pub fn request_stop(&self) -> bool {
        self.post(PlayerCommand::RequestStop)
    }

    pub fn request_pause(&self) -> bool {
        self.post(PlayerCommand::RequestPause)
    }

    pub fn request_resume(&self) -> bool {
        self.post(PlayerCommand::RequestResume)
    }
}

#[derive(Debug)]
pub struct CommandQueue {
    tx: Sender<PlayerCommand>,
    rx: Receiver<PlayerCommand>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything posted so far, in posting order.
    pub fn drain(&self) -> Vec<PlayerCommand> {
        self.rx.try_iter().collect()
    }
}
