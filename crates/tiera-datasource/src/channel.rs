//! Answer channel: how a datasource hands answers back to the engine.
//!
//! The engine owns the channel and calls `Datasource::lookup` once per cycle.
//! During a cycle the datasource may `submit` any number of answers and, once
//! it has nothing left to offer, `close` the channel. Whether more answers are
//! wanted is decided by the cascade mode, not by the datasource.

use tiera_core::{CascadeMode, Value};

#[derive(Debug)]
pub struct AnswerChannel {
    mode: CascadeMode,
    answers: Vec<Value>,
    closed: bool,
    cycle: usize,
}

impl AnswerChannel {
    pub fn new(mode: CascadeMode) -> Self {
        Self {
            mode,
            answers: Vec::new(),
            closed: false,
            cycle: 0,
        }
    }

    /// Offer an answer. Returns false if the channel no longer accepts answers.
    pub fn submit(&mut self, value: impl Into<Value>) -> bool {
        if !self.wants_more() {
            return false;
        }
        self.answers.push(value.into());
        true
    }

    /// Signal that the datasource has no more candidates.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// False once the datasource closed the channel, or once a first-match
    /// stage holds an answer.
    pub fn wants_more(&self) -> bool {
        if self.closed {
            return false;
        }
        match self.mode {
            CascadeMode::FirstMatch => self.answers.is_empty(),
            CascadeMode::Merge => true,
        }
    }

    pub fn mode(&self) -> CascadeMode {
        self.mode
    }

    /// Number of cycles started so far (1-indexed inside a lookup call).
    pub fn cycle(&self) -> usize {
        self.cycle
    }

    /// Start the next cycle. Called by the engine before each lookup call.
    pub fn begin_cycle(&mut self) {
        self.cycle += 1;
    }

    pub fn answers(&self) -> &[Value] {
        &self.answers
    }

    pub fn into_answers(self) -> Vec<Value> {
        self.answers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_match_stops_wanting_after_one_answer() {
        let mut ch = AnswerChannel::new(CascadeMode::FirstMatch);
        assert!(ch.wants_more());
        assert!(ch.submit(json!("blue")));
        assert!(!ch.wants_more());
        assert!(!ch.submit(json!("red")));
        assert_eq!(ch.answers(), &[json!("blue")]);
    }

    #[test]
    fn merge_accepts_until_closed() {
        let mut ch = AnswerChannel::new(CascadeMode::Merge);
        assert!(ch.submit(json!(1)));
        assert!(ch.submit(json!(2)));
        assert!(ch.wants_more());
        ch.close();
        assert!(ch.is_closed());
        assert!(!ch.submit(json!(3)));
        assert_eq!(ch.into_answers(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn cycles_count_up() {
        let mut ch = AnswerChannel::new(CascadeMode::Merge);
        assert_eq!(ch.cycle(), 0);
        ch.begin_cycle();
        ch.begin_cycle();
        assert_eq!(ch.cycle(), 2);
    }
}
