//! Streaming batch API: emit one result per file as it completes.
//!
//! [`crate::convert::convert_files`] returns only after the whole batch has
//! finished. [`convert_stream`] yields each [`ConversionResult`] as soon as
//! its file is written, so callers can report or upload outputs
//! incrementally. Files are converted in input order, one at a time, because
//! each conversion drives its own browser.

use crate::config::ConversionConfig;
use crate::convert;
use crate::output::{ConversionFailure, ConversionResult};
use futures::stream::{self, Stream};
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use tracing::{info, warn};

/// A boxed stream of per-file results.
pub type ResultStream = Pin<Box<dyn Stream<Item = ConversionResult> + Send>>;

/// Convert `inputs` lazily, in order.
///
/// Outputs go to `output_dir` when given, else next to each input. Polling
/// the stream drives the conversions; dropping it stops the batch. After a
/// failed browser launch the remaining inputs are yielded with the same
/// error without being attempted.
///
/// # Example
/// ```rust,no_run
/// use mdpress::{convert_stream, ConversionConfig};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() {
/// let inputs = vec!["a.md".into(), "b.md".into()];
/// let mut results = convert_stream(inputs, None, ConversionConfig::default());
/// while let Some(r) = results.next().await {
///     match r.error {
///         None => println!("{} ok", r.input.display()),
///         Some(e) => eprintln!("{}: {}", r.input.display(), e.message),
///     }
/// }
/// # }
/// ```
pub fn convert_stream(
    inputs: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    config: ConversionConfig,
) -> ResultStream {
    info!("Starting streaming conversion of {} file(s)", inputs.len());
    let s = stop_after_fatal(inputs, move |path| {
        let cfg = config.clone();
        let dir = output_dir.clone();
        async move {
            let out = crate::pipeline::input::output_path_for(&path, None, dir.as_deref());
            convert::convert_file(&path, Some(&out), &cfg).await
        }
    });
    Box::pin(s)
}

/// Run `convert` on each input in order until a result fails fatally.
fn stop_after_fatal<F, Fut>(inputs: Vec<PathBuf>, convert: F) -> impl Stream<Item = ConversionResult>
where
    F: FnMut(PathBuf) -> Fut,
    Fut: Future<Output = ConversionResult>,
{
    let state = (inputs.into_iter(), convert, None::<ConversionFailure>);
    stream::unfold(state, |(mut rest, mut convert, fatal)| async move {
        let path = rest.next()?;
        let result = match fatal {
            Some(ref failure) => ConversionResult::skipped(path, failure.clone()),
            None => convert(path).await,
        };
        let fatal = fatal.or_else(|| {
            let failure = result.error.clone().filter(ConversionFailure::is_fatal)?;
            warn!("Stopping stream: {}", failure.message);
            Some(failure)
        });
        Some((result, (rest, convert, fatal)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, MdPressError};
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn stream_yields_one_result_per_input_in_order() {
        let inputs = vec![PathBuf::from("/no/x.md"), PathBuf::from("/no/y.md")];
        let results: Vec<_> = convert_stream(inputs, None, ConversionConfig::default())
            .collect()
            .await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].input, PathBuf::from("/no/x.md"));
        assert_eq!(results[1].input, PathBuf::from("/no/y.md"));
        assert!(results
            .iter()
            .all(|r| r.error.as_ref().map(|e| e.kind) == Some(ErrorKind::FileNotFound)));
    }

    #[tokio::test]
    async fn empty_batch_is_an_empty_stream() {
        let mut s = convert_stream(Vec::new(), None, ConversionConfig::default());
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn browser_launch_failure_stops_the_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let inputs = vec![
            PathBuf::from("a.md"),
            PathBuf::from("b.md"),
            PathBuf::from("c.md"),
        ];
        let results: Vec<_> = stop_after_fatal(inputs, move |path| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let e = MdPressError::BrowserLaunch("no chrome".into());
                ConversionResult::failure(path, &e, Default::default())
            }
        })
        .collect()
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(results.len(), 3);
        assert_eq!(results[2].input, PathBuf::from("c.md"));
        assert!(results
            .iter()
            .all(|r| r.error.as_ref().map(|e| e.kind) == Some(ErrorKind::BrowserLaunch)));
    }
}
