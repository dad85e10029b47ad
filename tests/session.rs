use cutout::background::Background;
use cutout::color::Color;
use cutout::jobs::{Job, Outcome, Purpose};
use cutout::loader::ImageSource;
use cutout::samples::Sample;
use cutout::session::{Lane, Notice, Session, SessionError};
use image::GenericImageView;
use std::sync::{atomic::Ordering, Arc};
use std::time::{Duration, Instant};
use tempfile::tempdir;

mod common;
use common::{half_cutout, png_bytes, solid_image, with_temp_workdir, write_image, FakeRemover, Harness};

fn uploaded(cutout: &image::DynamicImage) -> Harness {
    let mut harness = Harness::new(Arc::new(FakeRemover::returning(cutout)));
    let photo = png_bytes(&solid_image(200, 300, [90, 90, 90, 255]));
    let job = harness.session.on_upload("a.png", photo);
    harness.run(Some(job));
    harness
}

#[test]
fn upload_color_then_undo_scenario() {
    let cutout = half_cutout(200, 300, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    assert!(harness.session.foreground().is_some());
    assert!(harness.session.history().is_empty());

    let job = harness.session.on_set_color("red").unwrap();
    harness.run(job);

    assert_eq!(harness.session.history().len(), 1);
    let shown = harness.displayed();
    assert_eq!(shown.dimensions(), (200, 300));
    let shown = shown.to_rgba8();
    assert_eq!(shown.get_pixel(0, 0).0, [0, 0, 255, 255]);
    assert_eq!(shown.get_pixel(199, 299).0, [255, 0, 0, 255]);
    let result = harness.session.result().unwrap().clone();
    assert!(result.as_blob().is_some_and(|blob| blob.mime() == "image/png"));

    let job = harness.session.on_undo();
    harness.run(job);
    assert!(harness.session.background().is_none());
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.session.backgrounds().undo_len(), 0);
    assert_eq!(harness.session.backgrounds().redo_len(), 1);
    assert_eq!(harness.session.result(), harness.session.foreground());
}

#[test]
fn redo_recomposites_without_touching_history() {
    let cutout = half_cutout(10, 10, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let job = harness.session.on_set_color("red").unwrap();
    harness.run(job);
    let job = harness.session.on_undo();
    harness.run(job);

    let job = harness.session.on_redo();
    assert!(matches!(job, Some(Job::Composite { purpose: Purpose::Preview, .. })));
    harness.run(job);
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.displayed().to_rgba8().get_pixel(9, 9).0, [255, 0, 0, 255]);
}

#[test]
fn reset_then_undo_restores_background_and_clears_selection() {
    let cutout = half_cutout(10, 10, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let job = harness.session.on_set_color("#00ff00").unwrap();
    harness.run(job);
    assert!(harness.session.selected().is_some());

    let job = harness.session.on_reset();
    harness.run(job);
    assert!(harness.session.background().is_none());
    assert!(harness.session.selected().is_none());

    let job = harness.session.on_undo();
    harness.run(job);
    assert_eq!(
        harness.session.background(),
        Some(&Background::Color(Color::parse("lime").unwrap()))
    );
}

#[test]
fn same_background_twice_composites_once() {
    let cutout = half_cutout(10, 10, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let job = harness.session.on_set_color("red").unwrap();
    harness.run(job);
    assert!(harness.session.on_set_color("#f00").unwrap().is_none());
    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.session.backgrounds().undo_len(), 1);
}

#[test]
fn image_background_upload_stays_local() {
    let cutout = half_cutout(8, 8, [0, 0, 255, 255]);
    let remover = Arc::new(FakeRemover::returning(&cutout));
    let mut harness = Harness::new(remover.clone());
    let job = harness.session.on_upload("a.png", png_bytes(&solid_image(8, 8, [1, 1, 1, 255])));
    harness.run(Some(job));

    let bg = png_bytes(&solid_image(2, 2, [255, 255, 0, 255]));
    let job = harness.session.on_upload_background(bg).unwrap();
    harness.run(job);
    assert_eq!(remover.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(harness.session.background(), Some(Background::Image(ImageSource::Blob(_)))));
    assert_eq!(harness.session.history().len(), 1);
}

#[test]
fn service_failure_raises_notice_and_keeps_state() {
    let mut harness = Harness::new(Arc::new(FakeRemover::failing(502)));
    let job = harness.session.on_upload("a.png", png_bytes(&solid_image(4, 4, [0, 0, 0, 255])));
    harness.run(Some(job));
    assert_eq!(harness.session.notice(), Some(&Notice::ServiceFailure));
    assert!(harness.session.foreground().is_none());
    assert!(harness.session.preview().is_some());
    assert!(!harness.session.is_waiting(Lane::Foreground));
    harness.session.dismiss_notice();
    assert!(harness.session.notice().is_none());
}

#[test]
fn actions_without_processed_image_are_rejected() {
    let mut harness = Harness::new(Arc::new(FakeRemover::failing(500)));
    let tmp = tempdir().unwrap();
    assert!(matches!(
        harness.session.on_download(tmp.path()),
        Err(SessionError::NoProcessedImage)
    ));
    assert_eq!(harness.session.notice(), Some(&Notice::NoProcessedImage));
    assert!(matches!(
        harness.session.on_set_color("red"),
        Err(SessionError::NoProcessedImage)
    ));
    assert!(harness.session.background().is_none());
    assert_eq!(harness.session.backgrounds().undo_len(), 0);
}

#[test]
fn invalid_color_leaves_state_untouched() {
    let cutout = half_cutout(4, 4, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let err = harness.session.on_set_color("not-a-color").unwrap_err();
    assert!(matches!(err, SessionError::InvalidColor(_)));
    assert!(matches!(harness.session.notice(), Some(Notice::InvalidColor(_))));
    assert!(harness.session.background().is_none());
    assert!(harness.session.history().is_empty());
}

#[test]
fn stale_composite_results_are_dropped() {
    let cutout = half_cutout(6, 6, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let first = harness.session.on_set_color("red").unwrap().unwrap();
    let second = harness.session.on_set_color("blue").unwrap().unwrap();

    // The later request finishes first; the earlier one lands afterwards.
    let second_outcome = harness.worker.run(second);
    let first_outcome = harness.worker.run(first);
    harness.session.apply(second_outcome);
    harness.session.apply(first_outcome);

    assert_eq!(harness.session.history().len(), 1);
    assert_eq!(harness.displayed().to_rgba8().get_pixel(5, 5).0, [0, 0, 255, 255]);
    // The dropped result's storage is gone: preview, cutout, blue composite.
    assert_eq!(harness.store.live_count(), 3);
}

#[test]
fn stale_cutout_from_earlier_upload_is_dropped() {
    let cutout = half_cutout(6, 6, [0, 0, 255, 255]);
    let mut harness = Harness::new(Arc::new(FakeRemover::returning(&cutout)));
    let first = harness.session.on_upload("a.png", png_bytes(&solid_image(6, 6, [1, 1, 1, 255])));
    let second = harness.session.on_upload("b.png", png_bytes(&solid_image(6, 6, [2, 2, 2, 255])));
    let first_outcome = harness.worker.run(first);
    assert!(harness.session.apply(first_outcome).is_none());
    assert!(harness.session.foreground().is_none());
    assert!(harness.session.is_waiting(Lane::Foreground));

    harness.run(Some(second));
    assert!(harness.session.foreground().is_some());
}

#[test]
fn carried_over_background_is_applied_to_new_cutout() {
    let cutout = half_cutout(6, 6, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let job = harness.session.on_set_color("red").unwrap();
    harness.run(job);

    let job = harness.session.on_upload("b.png", png_bytes(&solid_image(6, 6, [3, 3, 3, 255])));
    harness.run(Some(job));
    assert_eq!(harness.session.history().len(), 2);
    assert_eq!(harness.displayed().to_rgba8().get_pixel(5, 5).0, [255, 0, 0, 255]);
}

#[test]
fn restoring_history_makes_result_the_new_foreground() {
    let cutout = half_cutout(6, 6, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    let job = harness.session.on_set_color("red").unwrap();
    harness.run(job);
    let job = harness.session.on_set_color("lime").unwrap();
    harness.run(job);

    assert!(harness.session.on_restore_history(0));
    assert!(harness.session.background().is_none());
    assert!(harness.session.selected().is_none());
    let restored = harness.session.history().get(0).unwrap().source.clone();
    assert_eq!(harness.session.foreground(), Some(&restored));
    assert!(!harness.session.on_restore_history(7));

    // The red composite is now opaque everywhere, so blue never shows through.
    let job = harness.session.on_set_color("blue").unwrap();
    harness.run(job);
    assert_eq!(harness.displayed().to_rgba8().get_pixel(5, 5).0, [255, 0, 0, 255]);
}

#[test]
fn clear_history_releases_composites() {
    let cutout = half_cutout(6, 6, [0, 0, 255, 255]);
    let mut harness = uploaded(&cutout);
    for spec in ["red", "blue", "lime"] {
        let job = harness.session.on_set_color(spec).unwrap();
        harness.run(job);
    }
    assert_eq!(harness.session.history().len(), 3);
    // preview + cutout + three composites
    assert_eq!(harness.store.live_count(), 5);

    harness.session.on_clear_history();
    assert!(harness.session.history().is_empty());
    // the lime composite is still displayed
    assert_eq!(harness.store.live_count(), 3);
}

#[test]
fn sample_reveals_precomputed_result() {
    let tmp = tempdir().unwrap();
    let thumbnail = tmp.path().join("dog.png");
    let result = tmp.path().join("dog-result.png");
    write_image(&thumbnail, &solid_image(4, 4, [9, 9, 9, 255]));
    write_image(&result, &half_cutout(4, 4, [0, 0, 255, 255]));
    let sample = Sample {
        name: "dog".into(),
        thumbnail: thumbnail.clone(),
        result: result.clone(),
    };

    let mut harness = Harness::new(Arc::new(FakeRemover::failing(500)));
    harness.session.on_sample_selected(&sample);
    assert!(harness.session.result().is_none());
    assert_eq!(harness.session.preview(), Some(&ImageSource::Path(thumbnail)));
    let job = harness.session.poll_timers(Instant::now());
    harness.run(job);
    assert_eq!(harness.session.foreground(), Some(&ImageSource::Path(result)));
    assert_eq!(harness.session.next_timer(Instant::now()), None);
}

fn sample_pair(dir: &std::path::Path) -> Sample {
    let thumbnail = dir.join("cat.png");
    let result = dir.join("cat-result.png");
    write_image(&thumbnail, &solid_image(4, 4, [9, 9, 9, 255]));
    write_image(&result, &half_cutout(4, 4, [0, 255, 0, 255]));
    Sample {
        name: "cat".into(),
        thumbnail,
        result,
    }
}

#[test]
fn sample_reveal_waits_for_its_delay_without_a_worker() {
    let tmp = tempdir().unwrap();
    let sample = sample_pair(tmp.path());
    let mut harness = Harness::new(Arc::new(FakeRemover::failing(500)));
    harness.session = Session::new(harness.store.clone()).with_sample_delay(Duration::from_secs(3));

    let selected_at = Instant::now();
    harness.session.on_sample_selected(&sample);
    assert!(harness.session.is_waiting(Lane::Foreground));
    assert!(harness.session.poll_timers(selected_at).is_none());
    assert!(harness.session.foreground().is_none());
    let wait = harness.session.next_timer(selected_at).unwrap();
    assert!(wait >= Duration::from_secs(3) && wait < Duration::from_secs(4));

    let job = harness.session.poll_timers(selected_at + Duration::from_secs(4));
    assert!(job.is_none());
    assert_eq!(harness.session.foreground(), Some(&ImageSource::Path(sample.result)));
    assert!(!harness.session.is_waiting(Lane::Foreground));
}

#[test]
fn upload_supersedes_pending_sample_reveal() {
    let tmp = tempdir().unwrap();
    let sample = sample_pair(tmp.path());
    let cutout = half_cutout(4, 4, [0, 0, 255, 255]);
    let mut harness = Harness::new(Arc::new(FakeRemover::returning(&cutout)));

    harness.session.on_sample_selected(&sample);
    let job = harness.session.on_upload("a.png", png_bytes(&solid_image(4, 4, [1, 1, 1, 255])));
    assert_eq!(harness.session.next_timer(Instant::now()), None);
    assert!(harness.session.poll_timers(Instant::now()).is_none());
    harness.run(Some(job));
    assert_ne!(harness.session.foreground(), Some(&ImageSource::Path(sample.result)));
    assert!(harness.session.foreground().is_some());
}

#[test]
fn download_writes_composite_and_never_overwrites() {
    with_temp_workdir(|cwd| {
        let cutout = half_cutout(6, 4, [0, 0, 255, 255]);
        let mut harness = uploaded(&cutout);
        let job = harness.session.on_set_color("red").unwrap();
        harness.run(job);

        for expected in ["image_with_background.png", "image_with_background-1.png"] {
            let job = harness.session.on_download(std::path::Path::new(".")).unwrap();
            harness.run(Some(job));
            let saved = harness.session.last_download().unwrap().to_path_buf();
            assert_eq!(saved.file_name().unwrap(), expected);
            assert!(matches!(harness.session.notice(), Some(Notice::Downloaded(_))));
            let decoded = image::open(cwd.join(expected)).unwrap().to_rgba8();
            assert_eq!(decoded.dimensions(), (6, 4));
            assert_eq!(decoded.get_pixel(5, 3).0, [255, 0, 0, 255]);
        }
    });
}

#[test]
fn failed_download_raises_notice() {
    let mut harness = Harness::new(Arc::new(FakeRemover::failing(500)));
    let outcome = Outcome::Downloaded {
        result: Err(anyhow::anyhow!("disk full")),
    };
    assert!(harness.session.apply(outcome).is_none());
    assert_eq!(harness.session.notice(), Some(&Notice::DownloadFailure));
    assert!(harness.session.last_download().is_none());
}
