use crate::error::CommError;
use std::sync::mpsc::{channel, Receiver, Sender};

/// Message passing between the ranks cooperating on one grid.
/// Sends never block, receives block until the matching message arrives.
/// Messages between a pair of ranks are matched by tag.
pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn send(
        &mut self,
        dest: usize,
        tag: u64,
        payload: Vec<f64>,
    ) -> Result<(), CommError>;

    fn recv(&mut self, source: usize, tag: u64) -> Result<Vec<f64>, CommError>;
}

#[derive(Debug)]
struct Message {
    source: usize,
    tag: u64,
    payload: Vec<f64>,
}

fn take_stashed(
    stash: &mut Vec<Message>,
    source: usize,
    tag: u64,
) -> Option<Vec<f64>> {
    let position = stash
        .iter()
        .position(|m| m.source == source && m.tag == tag)?;
    Some(stash.remove(position).payload)
}

/// Communicator for a single process.
#[derive(Debug, Default)]
pub struct SelfComm {
    stash: Vec<Message>,
}

impl SelfComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send(
        &mut self,
        dest: usize,
        tag: u64,
        payload: Vec<f64>,
    ) -> Result<(), CommError> {
        if dest != 0 {
            return Err(CommError::InvalidRank { rank: dest, size: 1 });
        }
        self.stash.push(Message {
            source: 0,
            tag,
            payload,
        });
        Ok(())
    }

    fn recv(&mut self, source: usize, tag: u64) -> Result<Vec<f64>, CommError> {
        if source != 0 {
            return Err(CommError::InvalidRank {
                rank: source,
                size: 1,
            });
        }
        take_stashed(&mut self.stash, source, tag)
            .ok_or(CommError::Disconnected(source))
    }
}

/// In memory ranks connected by channels, one rank per thread.
pub struct ThreadComm {
    rank: usize,
    senders: Vec<Option<Sender<Message>>>,
    receiver: Receiver<Message>,
    stash: Vec<Message>,
}

impl ThreadComm {
    /// Create `size` connected ranks, hand element `i` to the thread running rank `i`.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..size).map(|_| channel()).unzip();
        receivers
            .into_iter()
            .enumerate()
            .map(|(rank, receiver)| ThreadComm {
                rank,
                // No sender to self, a rank whose peers all hung up sees a disconnect.
                senders: senders
                    .iter()
                    .enumerate()
                    .map(|(r, s)| if r == rank { None } else { Some(s.clone()) })
                    .collect(),
                receiver,
                stash: Vec::new(),
            })
            .collect()
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.senders.len()
    }

    fn send(
        &mut self,
        dest: usize,
        tag: u64,
        payload: Vec<f64>,
    ) -> Result<(), CommError> {
        let size = self.size();
        let message = Message {
            source: self.rank,
            tag,
            payload,
        };
        match self.senders.get(dest) {
            None => Err(CommError::InvalidRank { rank: dest, size }),
            Some(None) => {
                self.stash.push(message);
                Ok(())
            }
            Some(Some(sender)) => sender
                .send(message)
                .map_err(|_| CommError::Disconnected(dest)),
        }
    }

    fn recv(&mut self, source: usize, tag: u64) -> Result<Vec<f64>, CommError> {
        if source >= self.size() {
            return Err(CommError::InvalidRank {
                rank: source,
                size: self.size(),
            });
        }
        if let Some(payload) = take_stashed(&mut self.stash, source, tag) {
            return Ok(payload);
        }
        if source == self.rank {
            return Err(CommError::Disconnected(source));
        }
        loop {
            let message = self
                .receiver
                .recv()
                .map_err(|_| CommError::Disconnected(source))?;
            if message.source == source && message.tag == tag {
                return Ok(message.payload);
            }
            log::trace!(
                "rank {} stashing message from {} tag {}",
                self.rank,
                message.source,
                message.tag
            );
            self.stash.push(message);
        }
    }
}
