use std::cmp::Reverse;
use std::collections::BTreeSet;

use crate::priority::{Priority, CLEAR};

/// Pending message numbers, highest priority first and ties by number.
///
/// Each message is queued at most once; posting again can only raise its
/// priority.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    order: BTreeSet<(Reverse<Priority>, u8)>,
    queued: Vec<Priority>,
}

impl OutboundQueue {
    pub fn new(messages: usize) -> Self {
        Self {
            order: BTreeSet::new(),
            queued: vec![CLEAR; messages],
        }
    }

    /// Queue or promote `num`. Returns whether anything changed.
    pub fn post(&mut self, num: u8, priority: Priority) -> bool {
        let Some(slot) = self.queued.get_mut(num as usize) else {
            return false;
        };
        if priority <= *slot {
            return false;
        }
        if *slot != CLEAR {
            self.order.remove(&(Reverse(*slot), num));
        }
        *slot = priority;
        self.order.insert((Reverse(priority), num));
        true
    }

    pub fn remove(&mut self, num: u8) {
        if let Some(slot) = self.queued.get_mut(num as usize) {
            if *slot != CLEAR {
                self.order.remove(&(Reverse(*slot), num));
                *slot = CLEAR;
            }
        }
    }

    pub fn priority(&self, num: u8) -> Option<Priority> {
        self.queued
            .get(num as usize)
            .copied()
            .filter(|&p| p != CLEAR)
    }

    pub fn pop(&mut self) -> Option<(u8, Priority)> {
        let (Reverse(priority), num) = self.order.pop_first()?;
        self.queued[num as usize] = CLEAR;
        Some((num, priority))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
