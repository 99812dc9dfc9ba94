use std::time::Duration;
use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, KeyModifiers};

use crate::client::Worker;
use crate::config::RvConfig;
use crate::domain::{Message, Rank, RvError, SortKey};
use crate::model::Model;

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &RvConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Finished requests first, then at most one terminal event.
    pub fn handle_event(&self, model: &Model, worker: &Worker) -> Result<Option<Message>, RvError> {
        if let Some(message) = worker.try_recv()? {
            trace!("Worker answered: {message:?}");
            return Ok(Some(message));
        }

        if event::poll(Duration::from_millis(self.event_poll_time))? {
            return match event::read()? {
                Event::Key(key) if key.kind == event::KeyEventKind::Press => {
                    if model.raw_keyevents() {
                        Ok(Some(Message::RawKey(key)))
                    } else {
                        Ok(self.handle_key(key))
                    }
                }
                Event::Resize(width, height) => {
                    Ok(Some(Message::Resize(width as usize, height as usize)))
                }
                _ => Ok(None),
            };
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Message::Quit),
            (KeyCode::Char('q'), _) => Some(Message::Quit),
            (KeyCode::Esc, _) => Some(Message::Exit),
            (KeyCode::Enter, _) => Some(Message::Enter),
            (KeyCode::Char('?'), _) => Some(Message::Help),
            (KeyCode::Up, _) => Some(Message::MoveUp),
            (KeyCode::Down, _) => Some(Message::MoveDown),
            (KeyCode::PageUp, _) => Some(Message::MovePageUp),
            (KeyCode::PageDown, _) => Some(Message::MovePageDown),
            (KeyCode::Char('g'), _) | (KeyCode::Home, _) => Some(Message::MoveTop),
            (KeyCode::Char('G'), _) | (KeyCode::End, _) => Some(Message::MoveBottom),
            (KeyCode::Char('o'), _) => Some(Message::PickFile),
            (KeyCode::Char('p'), _) => Some(Message::CyclePosition),
            (KeyCode::Char('u'), _) => Some(Message::Upload),
            (KeyCode::Char('R'), _) => Some(Message::RandomizeRanks),
            (KeyCode::Char('r'), _) | (KeyCode::F(5), _) => Some(Message::Refresh),
            (KeyCode::Char('n'), _) => Some(Message::Sort(SortKey::Name)),
            (KeyCode::Char('d'), _) => Some(Message::Sort(SortKey::SubmissionDate)),
            (KeyCode::Char('s'), _) => Some(Message::Sort(SortKey::Position)),
            (KeyCode::Char('k'), _) => Some(Message::Sort(SortKey::Rank)),
            (KeyCode::Char('0'), _) => Some(Message::FilterRank(None)),
            (KeyCode::Char(c @ '1'..='5'), _) => c
                .to_digit(10)
                .and_then(|d| Rank::new(d as u8))
                .map(|rank| Message::FilterRank(Some(rank))),
            (KeyCode::Char('w'), _) => Some(Message::Download),
            (KeyCode::Char('y'), _) => Some(Message::CopyName),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn map(code: KeyCode) -> Option<Message> {
        Controller::new(&RvConfig::default()).handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn column_keys_map_to_sort() {
        assert_eq!(map(KeyCode::Char('n')), Some(Message::Sort(SortKey::Name)));
        assert_eq!(map(KeyCode::Char('d')), Some(Message::Sort(SortKey::SubmissionDate)));
        assert_eq!(map(KeyCode::Char('s')), Some(Message::Sort(SortKey::Position)));
        assert_eq!(map(KeyCode::Char('k')), Some(Message::Sort(SortKey::Rank)));
    }

    #[test]
    fn digit_keys_map_to_rank_filter() {
        assert_eq!(map(KeyCode::Char('0')), Some(Message::FilterRank(None)));
        assert_eq!(map(KeyCode::Char('3')), Some(Message::FilterRank(Rank::new(3))));
        assert_eq!(map(KeyCode::Char('6')), None);
    }

    #[test]
    fn ctrl_c_quits() {
        let controller = Controller::new(&RvConfig::default());
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(controller.handle_key(key), Some(Message::Quit));
    }
}
