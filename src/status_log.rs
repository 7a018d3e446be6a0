//! Append-only progress log backing the visible status text.
//!
//! Not synchronized: only the UI loop may hold one mutably.

#[derive(Debug, Default, Clone)]
pub(crate) struct StatusLog {
    entries: Vec<String>,
    // What the status region shows. Equals `entries.join("\n")` except after `set_text`.
    text: String,
}

impl StatusLog {
    pub(crate) fn append(&mut self, line: impl Into<String>) {
        self.entries.push(line.into());
        self.text = self.entries.join("\n");
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.text.clear();
    }

    /// Overwrite the visible text without touching the recorded entries.
    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub(crate) fn entries(&self) -> &[String] {
        &self.entries
    }

    pub(crate) fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn clear_drops_previous_run() {
        let mut log = StatusLog::default();
        log.append("first run");
        log.append("done");
        log.clear();
        assert_eq!(log.text(), "");
        log.append("second run");
        assert_eq!(log.text(), "second run");
        assert_eq!(log.entries(), ["second run".to_string()]);
    }

    #[test]
    fn append_rerenders_after_direct_text() {
        let mut log = StatusLog::default();
        log.append("a");
        log.set_text("System error");
        assert_eq!(log.text(), "System error");
        log.append("b");
        assert_eq!(log.text(), "a\nb");
    }

    proptest! {
        #[test]
        fn text_is_entries_joined_in_call_order(
            stale in proptest::collection::vec("[a-z ]{0,12}", 0..5),
            lines in proptest::collection::vec("[^\n]{0,24}", 0..20),
        ) {
            let mut log = StatusLog::default();
            for l in &stale {
                log.append(l.clone());
            }
            log.clear();
            for l in &lines {
                log.append(l.clone());
            }
            prop_assert_eq!(log.text(), lines.join("\n"));
            prop_assert_eq!(log.entries(), lines.as_slice());
        }
    }
}
