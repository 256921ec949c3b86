#![forbid(unsafe_code)]

//! Lane-tagged update queue owned by every host component.
//!
//! Updates are plain replacement values. An immediate pass applies the
//! newest immediate update but keeps everything from the first skipped
//! deferred update onward, so the deferred pass replays the full history in
//! order and ends on the newest value of either lane.

use crate::host::Lane;

#[derive(Debug)]
struct Update<T> {
    lane: Lane,
    value: T,
    /// Already rendered by an immediate pass, kept for the deferred replay.
    applied: bool,
}

#[derive(Debug)]
pub(crate) struct UpdateQueue<T> {
    updates: Vec<Update<T>>,
}

impl<T: Clone> UpdateQueue<T> {
    pub(crate) fn new() -> Self {
        Self {
            updates: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, lane: Lane, value: T) {
        self.updates.push(Update {
            lane,
            value,
            applied: false,
        });
    }

    pub(crate) fn has_pending(&self, pass: Lane) -> bool {
        match pass {
            Lane::Immediate => self
                .updates
                .iter()
                .any(|u| u.lane == Lane::Immediate && !u.applied),
            Lane::Deferred => !self.updates.is_empty(),
        }
    }

    pub(crate) fn has_deferred(&self) -> bool {
        self.updates.iter().any(|u| u.lane == Lane::Deferred)
    }

    /// Value produced by a pass over `pass`, if the queue has work for it.
    pub(crate) fn take(&mut self, pass: Lane) -> Option<T> {
        if !self.has_pending(pass) {
            return None;
        }
        match pass {
            Lane::Deferred => self.updates.drain(..).last().map(|u| u.value),
            Lane::Immediate => {
                let value = self
                    .updates
                    .iter()
                    .rev()
                    .find(|u| u.lane == Lane::Immediate)
                    .map(|u| u.value.clone());
                for update in &mut self.updates {
                    if update.lane == Lane::Immediate {
                        update.applied = true;
                    }
                }
                let first_skipped = self
                    .updates
                    .iter()
                    .position(|u| u.lane == Lane::Deferred)
                    .unwrap_or(self.updates.len());
                self.updates.drain(..first_skipped);
                value
            }
        }
    }

    /// Drop every deferred update, and with them the immediate updates that
    /// were only kept for replay.
    pub(crate) fn discard_deferred(&mut self) {
        self.updates
            .retain(|u| u.lane == Lane::Immediate && !u.applied);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.updates.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_pass_takes_newest_immediate() {
        let mut queue = UpdateQueue::new();
        queue.push(Lane::Immediate, 1);
        queue.push(Lane::Immediate, 2);
        assert_eq!(queue.take(Lane::Immediate), Some(2));
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.take(Lane::Immediate), None);
    }

    #[test]
    fn immediate_pass_skips_deferred_and_keeps_replay_tail() {
        let mut queue = UpdateQueue::new();
        queue.push(Lane::Deferred, 4);
        queue.push(Lane::Immediate, 3);
        queue.push(Lane::Deferred, 5);

        assert_eq!(queue.take(Lane::Immediate), Some(3));
        assert!(!queue.has_pending(Lane::Immediate));
        assert!(queue.has_deferred());
        assert_eq!(queue.take(Lane::Deferred), Some(5));
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn deferred_pass_ends_on_newest_value_of_either_lane() {
        let mut queue = UpdateQueue::new();
        queue.push(Lane::Immediate, 3);
        queue.push(Lane::Deferred, 5);
        queue.push(Lane::Immediate, 6);

        assert_eq!(queue.take(Lane::Immediate), Some(6));
        assert_eq!(queue.take(Lane::Deferred), Some(6));
    }

    #[test]
    fn discard_drops_deferred_and_replay_entries() {
        let mut queue = UpdateQueue::new();
        queue.push(Lane::Deferred, 4);
        queue.push(Lane::Immediate, 3);
        let _ = queue.take(Lane::Immediate);
        queue.push(Lane::Immediate, 9);

        queue.discard_deferred();
        assert!(!queue.has_deferred());
        assert_eq!(queue.take(Lane::Immediate), Some(9));
    }
}
