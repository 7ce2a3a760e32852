use rayon::ThreadPool;
use std::sync::mpsc;
use tracing::info;

/// Something that can receive human readable progress messages for a session.
pub trait ProgressSink: Sync {
    fn notify(&self, session_id: &str, message: &str);
}

/// Forwards progress messages to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn notify(&self, session_id: &str, message: &str) {
        info!(session_id, "{}", message);
    }
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn notify(&self, _session_id: &str, _message: &str) {}
}

/// Renders the progress line sent to the sink.
///
/// # Example
///
/// ```
/// use isonet::progress::progress_message;
///
/// let msg = progress_message(10);
/// assert!(msg.starts_with("Progress: 10% [#####-----"));
/// ```
pub fn progress_message(percent: usize) -> String {
    let filled = (percent / 2).min(50);
    format!(
        "Progress: {}% [{}{}]",
        percent,
        "#".repeat(filled),
        "-".repeat(50 - filled)
    )
}

/// Tracks completion of a fixed number of tasks and reports every new
/// whole percent, never going backwards.
pub struct PercentReporter<'a> {
    sink: &'a dyn ProgressSink,
    session_id: Option<&'a str>,
    total: usize,
    completed: usize,
    last_percent: Option<usize>,
}

impl<'a> PercentReporter<'a> {
    pub fn new(sink: &'a dyn ProgressSink, session_id: Option<&'a str>, total: usize) -> Self {
        Self {
            sink,
            session_id,
            total,
            completed: 0,
            last_percent: None,
        }
    }

    /// Marks one more task as complete, returns the percent if it was reported.
    pub fn tick(&mut self) -> Option<usize> {
        self.completed += 1;
        if self.total == 0 {
            return None;
        }
        let percent = 100 * self.completed / self.total;
        if self.last_percent.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_percent = Some(percent);
        if let Some(session_id) = self.session_id {
            self.sink.notify(session_id, &progress_message(percent));
        }
        Some(percent)
    }

    pub fn completed(&self) -> usize {
        self.completed
    }
}

/// Runs `task` over `items` on `pool`, ticking `reporter` in completion order.
///
/// Returns once every task finished, with results in input order.
pub(crate) fn map_with_progress<T, R, F>(
    pool: &ThreadPool,
    items: &[T],
    reporter: &mut PercentReporter<'_>,
    task: F,
) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let task = &task;
    let mut indexed: Vec<(usize, R)> = Vec::with_capacity(items.len());
    pool.in_place_scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for (i, item) in items.iter().enumerate() {
            let tx = tx.clone();
            scope.spawn(move |_| {
                // The receiver outlives the scope, so this never fails.
                let _ = tx.send((i, task(item)));
            });
        }
        drop(tx);
        for result in rx {
            reporter.tick();
            indexed.push(result);
        }
    });
    indexed.sort_by_key(|(i, _)| *i);
    indexed.into_iter().map(|(_, r)| r).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        messages: Mutex<Vec<(String, String)>>,
    }

    impl ProgressSink for Recorder {
        fn notify(&self, session_id: &str, message: &str) {
            self.messages
                .lock()
                .unwrap()
                .push((session_id.to_string(), message.to_string()));
        }
    }

    #[test]
    fn test_progress_message_bounds() {
        assert_eq!(
            progress_message(0),
            format!("Progress: 0% [{}]", "-".repeat(50))
        );
        assert_eq!(
            progress_message(100),
            format!("Progress: 100% [{}]", "#".repeat(50))
        );
    }

    #[test]
    fn test_reporter_only_reports_increases() {
        let rec = Recorder::default();
        let mut reporter = PercentReporter::new(&rec, Some("abc"), 300);
        let reported: Vec<usize> = (0..300).filter_map(|_| reporter.tick()).collect();
        assert_eq!(reported.len(), 101);
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(*reported.last().unwrap(), 100);

        let messages = rec.messages.lock().unwrap();
        assert_eq!(messages.len(), 101);
        assert!(messages.iter().all(|(s, _)| s == "abc"));
    }

    #[test]
    fn test_map_with_progress_keeps_input_order() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let rec = Recorder::default();
        let mut reporter = PercentReporter::new(&rec, Some("s"), 10);
        let items: Vec<u64> = (0..10).collect();
        let out = map_with_progress(&pool, &items, &mut reporter, |x| x * x);
        assert_eq!(out, items.iter().map(|x| x * x).collect::<Vec<_>>());
        assert_eq!(reporter.completed(), 10);
        let messages = rec.messages.lock().unwrap();
        assert!(messages.last().unwrap().1.starts_with("Progress: 100%"));
    }

    #[test]
    fn test_reporter_without_session_is_silent() {
        let rec = Recorder::default();
        let mut reporter = PercentReporter::new(&rec, None, 4);
        for _ in 0..4 {
            reporter.tick();
        }
        assert_eq!(reporter.completed(), 4);
        assert!(rec.messages.lock().unwrap().is_empty());
    }
}
