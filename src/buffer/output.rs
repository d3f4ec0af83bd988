use std::collections::VecDeque;

use parking_lot::Mutex;

/// Default number of lines kept in the scroll-back
pub const DEFAULT_CAPACITY: usize = 1000;

/// Display severity of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Error,
}

/// A single line of scroll-back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub severity: Severity,
    pub text: String,
}

impl OutputLine {
    /// Create a new OutputLine
    pub fn new(severity: Severity, text: impl Into<String>) -> Self {
        Self {
            severity,
            text: text.into(),
        }
    }

    pub fn normal(text: impl Into<String>) -> Self {
        Self::new(Severity::Normal, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(Severity::Error, text)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Bounded, thread-safe ring buffer of output lines
///
/// Every producer (built-ins, stream readers, the host) appends through
/// `&self`; the internal lock linearizes all mutations. When the capacity is
/// exceeded the oldest lines are discarded.
#[derive(Debug)]
pub struct OutputBuffer {
    lines: Mutex<VecDeque<OutputLine>>,
    max_lines: usize,
}

impl OutputBuffer {
    /// Create a buffer with specified max lines
    ///
    /// # Arguments
    /// * `max_lines` - Maximum number of lines to keep (0 for unlimited)
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::new()),
            max_lines,
        }
    }

    /// Maximum number of lines kept (0 for unlimited)
    pub fn capacity(&self) -> usize {
        self.max_lines
    }

    /// Add an output line
    ///
    /// When max_lines is exceeded, lines are discarded from the front.
    pub fn append(&self, line: OutputLine) {
        let mut lines = self.lines.lock();
        lines.push_back(line);
        if self.max_lines > 0 {
            while lines.len() > self.max_lines {
                lines.pop_front();
            }
        }
    }

    /// Append several lines under a single lock acquisition
    ///
    /// Other producers cannot interleave inside the block.
    pub fn append_all<I>(&self, block: I)
    where
        I: IntoIterator<Item = OutputLine>,
    {
        let mut lines = self.lines.lock();
        lines.extend(block);
        if self.max_lines > 0 && lines.len() > self.max_lines {
            let excess = lines.len() - self.max_lines;
            lines.drain(..excess);
        }
    }

    pub fn push_normal(&self, text: impl Into<String>) {
        self.append(OutputLine::normal(text));
    }

    pub fn push_error(&self, text: impl Into<String>) {
        self.append(OutputLine::error(text));
    }

    /// Remove every line
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Consistent copy of all lines in insertion order
    pub fn snapshot(&self) -> Vec<OutputLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Get lines in specified range
    ///
    /// # Arguments
    /// * `start` - Start index (0-based)
    /// * `count` - Number of lines to get
    ///
    /// # Returns
    /// Lines in the specified range. Empty or partial result if out of bounds.
    pub fn get_range(&self, start: usize, count: usize) -> Vec<OutputLine> {
        self.lines
            .lock()
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    /// Return the number of lines in the buffer
    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use rstest::rstest;

    use super::*;

    fn texts(buffer: &OutputBuffer) -> Vec<String> {
        buffer.snapshot().into_iter().map(|l| l.text).collect()
    }

    #[test]
    fn output_buffer_append_adds_line_to_buffer() {
        let buffer = OutputBuffer::new(100);
        buffer.append(OutputLine::normal("hello"));

        assert_eq!(buffer.len(), 1);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn output_buffer_append_discards_oldest_line_when_max_exceeded() {
        let buffer = OutputBuffer::new(3);
        buffer.push_normal("line1");
        buffer.push_normal("line2");
        buffer.push_normal("line3");
        buffer.push_normal("line4");

        assert_eq!(buffer.len(), 3);
        assert_eq!(texts(&buffer), vec!["line2", "line3", "line4"]);
    }

    #[rstest]
    #[case(5, 3)]
    #[case(5, 5)]
    #[case(5, 6)]
    #[case(5, 1000)]
    #[case(1, 10)]
    fn output_buffer_keeps_most_recent_lines_in_order(
        #[case] capacity: usize,
        #[case] appended: usize,
    ) {
        let buffer = OutputBuffer::new(capacity);
        for i in 0..appended {
            buffer.push_normal(format!("line{}", i));
        }

        let expected: Vec<String> = (appended.saturating_sub(capacity)..appended)
            .map(|i| format!("line{}", i))
            .collect();
        assert!(buffer.len() <= capacity);
        assert_eq!(texts(&buffer), expected);
    }

    #[test]
    fn output_buffer_append_unlimited_when_max_lines_is_zero() {
        let buffer = OutputBuffer::new(0);
        for i in 0..2000 {
            buffer.push_normal(format!("line{}", i));
        }

        assert_eq!(buffer.len(), 2000);
    }

    #[test]
    fn output_buffer_append_all_trims_to_capacity() {
        let buffer = OutputBuffer::new(3);
        buffer.push_normal("old");
        buffer.append_all((0..4).map(|i| OutputLine::normal(format!("new{}", i))));

        assert_eq!(texts(&buffer), vec!["new1", "new2", "new3"]);
    }

    #[test]
    fn output_buffer_clear_empties_full_buffer() {
        let buffer = OutputBuffer::new(2);
        buffer.push_normal("a");
        buffer.push_error("b");
        buffer.push_normal("c");

        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.snapshot().is_empty());
    }

    #[test]
    fn output_buffer_clear_on_empty_buffer_is_noop() {
        let buffer = OutputBuffer::default();
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn output_buffer_get_range_returns_correct_lines() {
        let buffer = OutputBuffer::new(100);
        for i in 0..10 {
            buffer.push_normal(format!("line{}", i));
        }

        let lines = buffer.get_range(3, 4);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].text, "line3");
        assert_eq!(lines[3].text, "line6");
    }

    #[test]
    fn output_buffer_get_range_returns_empty_when_start_exceeds_buffer() {
        let buffer = OutputBuffer::new(100);
        for i in 0..5 {
            buffer.push_normal(format!("line{}", i));
        }

        assert!(buffer.get_range(10, 5).is_empty());
        assert_eq!(buffer.get_range(3, 10).len(), 2);
    }

    #[test]
    fn output_buffer_snapshot_preserves_severity() {
        let buffer = OutputBuffer::new(100);
        buffer.push_normal("line1");
        buffer.push_error("line2");

        let lines = buffer.snapshot();
        assert_eq!(lines[0], OutputLine::normal("line1"));
        assert!(lines[1].is_error());
    }

    #[test]
    fn output_buffer_concurrent_appends_lose_nothing() {
        let buffer = Arc::new(OutputBuffer::new(0));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..250 {
                        buffer.push_normal(format!("{}:{}", p, i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let lines = texts(&buffer);
        assert_eq!(lines.len(), 1000);
        // Each producer's own lines keep their relative order
        for p in 0..4 {
            let own: Vec<_> = lines
                .iter()
                .filter(|l| l.starts_with(&format!("{}:", p)))
                .cloned()
                .collect();
            let expected: Vec<_> = (0..250).map(|i| format!("{}:{}", p, i)).collect();
            assert_eq!(own, expected);
        }
    }
}
