//! Integration tests: run decode results through the result processor and
//! check buffer ownership, failure reporting and request state.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use relume_pipeline::{
    BufferInfo, BufferPool, CorruptResultError, DecodeResult, DecodedPayload, FailureCause,
    ImageInfo, LoadRequest, PixelBuffer, PixelFormat, PoolMisuseError, ProcessingFailure,
    RequestState, Resize, ResizeFilter, ResultProcessor, RgbaImage, SkipReason, Transform,
    TransformError, TransformKind, TransformOptions,
};

/// What a [`Scripted`] transform does when applied.
#[derive(Debug, Clone, Copy)]
enum Behavior {
    /// Return the input itself.
    InPlace,
    /// Return a fresh buffer of the same shape.
    Replace,
    /// Fail without touching anything.
    Fail,
    /// Release the input, then return a fresh buffer.
    ReleaseInputThenReplace,
    /// Release the input and return it anyway.
    ReleaseInputReturnSame,
    /// Release the input, then fail.
    ReleaseInputThenFail,
    /// Return a fresh buffer that was already released.
    ReturnReleased,
    /// Return a zero-area buffer.
    ReturnEmpty,
    /// Release the input twice.
    DoubleRelease,
}

#[derive(Debug)]
struct Scripted {
    behavior: Behavior,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transform for Scripted {
    fn key(&self) -> String {
        format!("Scripted({:?})", self.behavior)
    }

    fn apply(
        &self,
        pool: &BufferPool,
        input: &PixelBuffer,
        _resize: Option<&Resize>,
        _low_quality: bool,
    ) -> Result<PixelBuffer, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::InPlace => Ok(input.clone()),
            Behavior::Replace => Ok(pool.acquire(input.info())?),
            Behavior::Fail => Err(TransformError::Failed("scripted failure".to_string())),
            Behavior::ReleaseInputThenReplace => {
                let info = input.info();
                pool.release(input)?;
                Ok(pool.acquire(info)?)
            }
            Behavior::ReleaseInputReturnSame => {
                pool.release(input)?;
                Ok(input.clone())
            }
            Behavior::ReleaseInputThenFail => {
                pool.release(input)?;
                Err(TransformError::Failed("failed after release".to_string()))
            }
            Behavior::ReturnReleased => {
                let output = pool.acquire(input.info())?;
                pool.release(&output)?;
                Ok(output)
            }
            Behavior::ReturnEmpty => Ok(pool.acquire(BufferInfo::new(0, 0, input.format()))?),
            Behavior::DoubleRelease => {
                pool.release(input)?;
                pool.release(input)?;
                Ok(input.clone())
            }
        }
    }
}

type Reported = Arc<Mutex<Vec<ProcessingFailure>>>;

struct Fixture {
    processor: ResultProcessor,
    reported: Reported,
    request: LoadRequest,
    result: DecodeResult,
    input: PixelBuffer,
}

fn fixture(transform: Arc<dyn Transform>) -> Fixture {
    fixture_with_target(transform, Resize::fit(8, 8))
}

fn fixture_with_target(transform: Arc<dyn Transform>, target: Resize) -> Fixture {
    let pool = Arc::new(BufferPool::default());
    let reported: Reported = Arc::default();
    let sink = Arc::clone(&reported);
    let processor = ResultProcessor::new(Arc::clone(&pool))
        .with_failure_callback(move |failure: &ProcessingFailure| {
            sink.lock().unwrap().push(failure.clone());
        });

    let image = RgbaImage::from_fn(16, 8, |x, y| {
        image::Rgba([(x * 16) as u8, (y * 32) as u8, 200, 255])
    });
    let input = pool.acquire_rgba(&image, PixelFormat::Rgba8).unwrap();
    let result = DecodeResult::bitmap(input.clone(), ImageInfo::new(16, 8, "image/png"));

    let options = TransformOptions::new()
        .with_resize(target)
        .with_transform(transform);
    let mut request = LoadRequest::new("https://example.com/photo.png", options);
    request.transition(RequestState::Decoding).unwrap();

    Fixture {
        processor,
        reported,
        request,
        result,
        input,
    }
}

fn reclamations(processor: &ResultProcessor) -> u64 {
    let stats = processor.pool().stats();
    stats.pooled + stats.dropped
}

#[test]
fn banned_result_never_invokes_transform() {
    let transform = Scripted::new(Behavior::Replace);
    let mut f = fixture(transform.clone());
    let mut result = f.result.clone().banned();

    let outcome = f.processor.process(&mut f.request, &mut result).unwrap();

    assert_eq!(outcome.skip_reason(), Some(SkipReason::Banned));
    assert_eq!(transform.calls(), 0);
    assert!(!result.is_processed());
    assert!(result.buffer().unwrap().same_instance(&f.input));
    // Processing was waived, so the request may complete directly.
    f.request.transition(RequestState::Completed).unwrap();
}

#[test]
fn animated_payload_is_not_a_bitmap() {
    let transform = Scripted::new(Behavior::Replace);
    let mut f = fixture(transform.clone());
    let mut result = DecodeResult::new(
        DecodedPayload::Animated { frame_count: 3 },
        ImageInfo::new(16, 8, "image/gif"),
    );

    let outcome = f.processor.process(&mut f.request, &mut result).unwrap();

    assert_eq!(outcome.skip_reason(), Some(SkipReason::NotBitmap));
    assert_eq!(transform.calls(), 0);
    f.request.transition(RequestState::Completed).unwrap();
}

#[test]
fn missing_and_released_buffers_are_absent() {
    let transform = Scripted::new(Behavior::Replace);

    let mut f = fixture(transform.clone());
    let mut missing = DecodeResult::new(
        DecodedPayload::Bitmap(None),
        ImageInfo::new(16, 8, "image/png"),
    );
    let outcome = f.processor.process(&mut f.request, &mut missing).unwrap();
    assert_eq!(outcome.skip_reason(), Some(SkipReason::BufferAbsent));

    let mut f = fixture(transform.clone());
    f.processor.pool().release(&f.input).unwrap();
    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();
    assert_eq!(outcome.skip_reason(), Some(SkipReason::BufferAbsent));

    assert_eq!(transform.calls(), 0);
}

#[test]
fn different_instance_reclaims_input_exactly_once() {
    let transform = Scripted::new(Behavior::Replace);
    let mut f = fixture(transform.clone());

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let diag = outcome.diagnostics().unwrap();
    assert!(diag.replaced);
    assert_eq!(transform.calls(), 1);
    assert_eq!(reclamations(&f.processor), 1);
    assert!(f.input.is_released());
    assert_eq!(
        f.input.read(<[u8]>::len),
        Err(PoolMisuseError::UseAfterRelease { id: f.input.id() })
    );

    let held = f.result.buffer().unwrap();
    assert!(!held.same_instance(&f.input));
    assert!(!held.is_released());
    assert!(f.result.is_processed());
    assert_eq!(f.result.transformed(), &["Scripted(Replace)".to_string()]);
    assert_eq!(f.request.state(), RequestState::Processing);
    f.request.transition(RequestState::Completed).unwrap();
}

#[test]
fn same_instance_is_not_reclaimed() {
    let transform = Scripted::new(Behavior::InPlace);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let diag = outcome.diagnostics().unwrap();
    assert!(!diag.replaced);
    assert_eq!(diag.reclaimed, None);
    assert_eq!(reclamations(&f.processor), 0);
    assert!(!f.input.is_released());
    assert!(f.result.buffer().unwrap().same_instance(&f.input));
    assert!(f.result.is_processed());
}

#[test]
fn transform_that_released_its_input_is_not_reclaimed_again() {
    let transform = Scripted::new(Behavior::ReleaseInputThenReplace);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let diag = outcome.diagnostics().unwrap();
    assert!(diag.replaced);
    assert_eq!(diag.reclaimed, None);
    assert_eq!(reclamations(&f.processor), 1);
    assert!(f.result.is_processed());
    assert!(!f.result.buffer().unwrap().is_released());
}

#[test]
fn failure_leaves_original_buffer_and_reports_once() {
    let transform = Scripted::new(Behavior::Fail);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let failure = outcome.failure().unwrap();
    assert_eq!(failure.request_key, "https://example.com/photo.png");
    assert_eq!(failure.transform_key, "Scripted(Fail)");
    assert_eq!(
        failure.cause,
        FailureCause::Transform(TransformError::Failed("scripted failure".to_string()))
    );

    let held = f.result.buffer().unwrap();
    assert!(held.same_instance(&f.input));
    assert!(!held.is_released());
    assert!(!f.result.is_processed());
    assert!(f.result.transformed().is_empty());
    assert_eq!(reclamations(&f.processor), 0);
    assert_eq!(f.request.state(), RequestState::Failed);

    let reported = f.reported.lock().unwrap();
    assert_eq!(reported.len(), 1);
    assert_eq!(&reported[0], failure);
}

#[test]
fn failed_builtin_transform_leaves_input_intact() {
    let mut f = fixture(Arc::new(TransformKind::Blur { sigma: f32::NAN }));
    let before = f.input.read(<[u8]>::to_vec).unwrap();

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert!(matches!(
        outcome.failure().unwrap().cause,
        FailureCause::Transform(TransformError::InvalidParameter(_))
    ));
    assert_eq!(f.input.read(<[u8]>::to_vec).unwrap(), before);
}

#[test]
fn released_output_is_a_corrupt_result() {
    let transform = Scripted::new(Behavior::ReturnReleased);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let failure = outcome.failure().unwrap();
    assert!(matches!(
        failure.cause,
        FailureCause::CorruptResult(CorruptResultError::Released { .. })
    ));
    assert!(f.result.buffer().unwrap().same_instance(&f.input));
    assert!(!f.input.is_released());
    assert!(!f.result.is_processed());
    assert_eq!(f.request.state(), RequestState::Failed);
}

#[test]
fn empty_output_is_released_and_reported() {
    let transform = Scripted::new(Behavior::ReturnEmpty);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert_eq!(
        outcome.failure().unwrap().cause,
        FailureCause::CorruptResult(CorruptResultError::Empty {
            width: 0,
            height: 0
        })
    );
    // The empty output went back to the pool; the input stays.
    assert_eq!(reclamations(&f.processor), 1);
    assert!(!f.input.is_released());
}

#[test]
fn released_same_instance_is_removed_from_result() {
    let transform = Scripted::new(Behavior::ReleaseInputReturnSame);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert!(matches!(
        outcome.failure().unwrap().cause,
        FailureCause::CorruptResult(CorruptResultError::Released { .. })
    ));
    assert!(f.result.buffer().is_none());
    assert!(!f.result.is_processed());
}

#[test]
fn input_released_before_failure_is_removed_from_result() {
    let transform = Scripted::new(Behavior::ReleaseInputThenFail);
    let mut f = fixture(transform);

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert_eq!(
        outcome.failure().unwrap().cause,
        FailureCause::Transform(TransformError::Failed("failed after release".to_string()))
    );
    assert!(f.input.is_released());
    assert!(f.result.buffer().is_none());
    assert!(!f.result.is_processed());
    assert_eq!(f.request.state(), RequestState::Failed);
    assert_eq!(f.reported.lock().unwrap().len(), 1);
}

#[test]
fn huge_resize_target_fails_the_request() {
    let mut f = fixture_with_target(
        Arc::new(TransformKind::Resize {
            filter: ResizeFilter::Lanczos3,
        }),
        Resize::exact(u32::MAX, u32::MAX),
    );

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert!(matches!(
        outcome.failure().unwrap().cause,
        FailureCause::Transform(TransformError::Allocation(_))
    ));
    assert!(f.result.buffer().unwrap().same_instance(&f.input));
    assert!(!f.input.is_released());
    assert_eq!(f.request.state(), RequestState::Failed);
}

#[test]
fn infinite_blur_fails_the_request() {
    let mut f = fixture(Arc::new(TransformKind::Blur {
        sigma: f32::INFINITY,
    }));

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    assert!(matches!(
        outcome.failure().unwrap().cause,
        FailureCause::Transform(TransformError::InvalidParameter(_))
    ));
    assert!(f.result.buffer().unwrap().same_instance(&f.input));
    assert!(!f.input.is_released());
}

#[test]
fn pool_misuse_in_transform_escapes() {
    let transform = Scripted::new(Behavior::DoubleRelease);
    let mut f = fixture(transform);

    let err = f.processor.process(&mut f.request, &mut f.result).unwrap_err();

    assert_eq!(err, PoolMisuseError::DoubleRelease { id: f.input.id() });
    assert!(f.reported.lock().unwrap().is_empty());
}

#[test]
fn resize_through_processor_changes_held_buffer() {
    let mut f = fixture(Arc::new(TransformKind::Resize {
        filter: ResizeFilter::CatmullRom,
    }));

    let outcome = f.processor.process(&mut f.request, &mut f.result).unwrap();

    let diag = outcome.diagnostics().unwrap();
    assert_eq!(diag.input, BufferInfo::new(16, 8, PixelFormat::Rgba8));
    assert_eq!(diag.output, BufferInfo::new(8, 4, PixelFormat::Rgba8));
    assert_eq!(f.result.buffer().unwrap().info(), diag.output);
    assert!(f.input.is_released());
    assert_eq!(f.result.transformed(), &["Resize(CatmullRom)".to_string()]);
}

#[test]
fn concurrent_processing_shares_one_pool() {
    let pool = Arc::new(BufferPool::default());
    let processor = Arc::new(ResultProcessor::new(Arc::clone(&pool)));
    let options = TransformOptions::new()
        .with_resize(Resize::fit(4, 4))
        .with_transform(Arc::new(TransformKind::Resize {
            filter: ResizeFilter::Nearest,
        }));

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let processor = Arc::clone(&processor);
            let options = options.clone();
            thread::spawn(move || {
                for i in 0..16 {
                    let pool = processor.pool();
                    let input = pool
                        .acquire(BufferInfo::new(16, 16, PixelFormat::Rgba8))
                        .unwrap();
                    let mut result =
                        DecodeResult::bitmap(input.clone(), ImageInfo::new(16, 16, "image/png"));
                    let mut request = LoadRequest::new(format!("w{worker}/{i}"), options.clone());
                    request.transition(RequestState::Decoding).unwrap();

                    let outcome = processor.process(&mut request, &mut result).unwrap();
                    assert!(outcome.diagnostics().is_some());
                    assert!(input.is_released());

                    let output = result.buffer().unwrap().clone();
                    pool.release(&output).unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let stats = pool.stats();
    // Every acquisition (input + output) was released exactly once.
    assert_eq!(stats.hits + stats.misses, 8 * 16 * 2);
    assert_eq!(stats.pooled + stats.dropped, 8 * 16 * 2);
}
