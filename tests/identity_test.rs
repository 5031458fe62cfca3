use std::collections::VecDeque;
use std::convert::Infallible;

use chrono::{Duration, Utc};
use ndarray::{Array1, Array3, ArrayView3, array};
use reid_track::{
    CarriedEmbeddings, CoordinatorConfig, Detection, DetectionSource, FeatureBank,
    FeatureBankConfig, IdentityCoordinator, IdentityId, MemoryGallery, RefinementEngine,
};

/// Detector replaying a fixed script of frames.
struct ScriptedDetector {
    frames: VecDeque<Vec<Detection>>,
}

impl ScriptedDetector {
    fn new(frames: Vec<Vec<Detection>>) -> Self {
        Self { frames: frames.into() }
    }
}

impl DetectionSource for ScriptedDetector {
    type Error = Infallible;

    fn detect(&mut self, _image: ArrayView3<'_, u8>) -> Result<Vec<Detection>, Self::Error> {
        Ok(self.frames.pop_front().unwrap_or_default())
    }
}

/// Verifier that always confirms the crop.
struct AlwaysPresent;

impl DetectionSource for AlwaysPresent {
    type Error = Infallible;

    fn detect(&mut self, _image: ArrayView3<'_, u8>) -> Result<Vec<Detection>, Self::Error> {
        Ok(vec![Detection::new(0.0, 0.0, 1.0, 1.0)])
    }
}

fn e1() -> Array1<f32> {
    array![0.9_f32, 0.1, 0.3, 0.2]
}

type Coordinator = IdentityCoordinator<ScriptedDetector, CarriedEmbeddings>;

/// Coordinator with default config over a store-backed feature bank.
fn with_store(frames: Vec<Vec<Detection>>, store: &MemoryGallery) -> Coordinator {
    let bank = FeatureBank::with_store(FeatureBankConfig::default(), store.clone()).unwrap();
    let detector = ScriptedDetector::new(frames);
    IdentityCoordinator::new(detector, CarriedEmbeddings, CoordinatorConfig::default())
        .unwrap()
        .with_feature_bank(bank)
}

#[test]
fn test_reid_stability_under_noise() {
    let mut bank = FeatureBank::new(FeatureBankConfig::default()).unwrap();
    let v = e1();
    let noisy = &v + &array![0.02_f32, -0.01, 0.015, -0.02];

    let a = bank.resolve(&v);
    let b = bank.resolve(&noisy);
    assert_eq!(a, b);
}

#[test]
fn test_dissimilar_embeddings_get_distinct_identities() {
    let mut bank = FeatureBank::new(FeatureBankConfig::default()).unwrap();
    let a = bank.resolve(&array![1.0_f32, 0.0, 0.0, 0.0]);
    let b = bank.resolve(&array![0.0_f32, 0.0, 1.0, 0.0]);
    assert_ne!(a, b);
    assert_eq!(bank.len(), 2);
}

#[test]
fn test_protected_identity_survives_any_age() {
    let mut bank = FeatureBank::new(FeatureBankConfig::default()).unwrap();
    let id = bank.resolve_at(&e1(), Utc::now() - Duration::days(365));
    let protected = vec![id.clone()];

    for _ in 0..3 {
        assert!(bank.expire(Duration::seconds(1), &protected).is_empty());
        assert!(bank.get(&id).is_some());
    }
    assert_eq!(bank.expire(Duration::seconds(1), &[]), vec![id]);
}

#[test]
fn test_end_to_end_track_and_reidentify() {
    let max_disappeared = 3;
    let mut frames = vec![
        vec![Detection::new(100.0, 100.0, 300.0, 200.0).with_embedding(e1())],
        vec![Detection::new(105.0, 105.0, 305.0, 205.0).with_embedding(e1())],
    ];
    for _ in 0..=max_disappeared {
        frames.push(vec![]);
    }
    frames.push(vec![Detection::new(800.0, 900.0, 1000.0, 1000.0).with_embedding(e1())]);

    let mut config = CoordinatorConfig::default();
    config.tracker.max_disappeared = max_disappeared;
    let detector = ScriptedDetector::new(frames);
    let mut coordinator = IdentityCoordinator::new(detector, CarriedEmbeddings, config)
        .unwrap()
        .with_refiner(RefinementEngine::with_default_config(AlwaysPresent).unwrap());
    let image = Array3::<u8>::zeros((1080, 1920, 3));

    // frame 1: fresh identity on track 0
    let out = coordinator.update(image.view()).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].track_id, 0);
    assert_eq!(out[0].confidence, Some(1.0));
    let identity = out[0].identity_id.clone();

    // frame 2: small shift, same track and identity
    let out = coordinator.update(image.view()).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].track_id, 0);
    assert_eq!(out[0].identity_id, identity);
    assert_eq!(out[0].centroid.x, 155.0);
    assert_eq!(out[0].centroid.y, 205.0);

    // gone long enough for the track to expire
    for _ in 0..max_disappeared {
        assert!(coordinator.update(image.view()).unwrap().is_empty());
        assert!(coordinator.tracker().contains(0));
    }
    assert!(coordinator.update(image.view()).unwrap().is_empty());
    assert!(coordinator.tracker().is_empty());
    assert!(coordinator.bindings().is_empty());

    // reappears far away: new track, same durable identity
    let out = coordinator.update(image.view()).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].track_id, 1);
    assert_eq!(out[0].identity_id, identity);
    assert_eq!(coordinator.feature_bank().len(), 1);
}

#[test]
fn test_identity_survives_across_sessions() {
    let store = MemoryGallery::new();
    let image = Array3::<u8>::zeros((480, 640, 3));
    let det = || vec![Detection::new(100.0, 100.0, 300.0, 200.0).with_embedding(e1())];

    let first_id = {
        let mut session = with_store(vec![det()], &store);
        let out = session.update(image.view()).unwrap();
        out[0].identity_id.clone()
    };
    assert_eq!(store.len(), 1);

    let mut session = with_store(vec![det()], &store);
    let out = session.update(image.view()).unwrap();
    assert_eq!(out[0].identity_id, first_id);
    assert_eq!(out[0].track_id, 0);
}

#[test]
fn test_store_outage_does_not_block_frames() {
    let store = MemoryGallery::new();
    store.set_online(false);
    let image = Array3::<u8>::zeros((480, 640, 3));
    let frames = vec![vec![Detection::new(100.0, 100.0, 300.0, 200.0).with_embedding(e1())]];
    let mut coordinator = with_store(frames, &store);

    let out = coordinator.update(image.view()).unwrap();
    assert_eq!(out[0].identity_id, IdentityId::new("ID_001"));
    assert!(!coordinator.feature_bank().store_ready());

    // background maintenance pushes the local identity once the store is back
    store.set_online(true);
    coordinator.maintain(Utc::now());
    assert!(coordinator.feature_bank().store_ready());
    assert!(store.get(&IdentityId::new("ID_001")).is_some());
}

#[test]
fn test_swept_identity_is_not_reloaded_from_store() {
    let store = MemoryGallery::new();
    let mut coordinator = with_store(vec![], &store);
    let t0 = Utc::now();
    let stale = coordinator
        .feature_bank_mut()
        .resolve_at(&e1(), t0 - Duration::days(2));

    // first round: flush, sync, then sweep
    assert_eq!(coordinator.maintain(t0), vec![stale.clone()]);
    assert!(store.get(&stale).is_none());

    // next round flushes and syncs again, the identity stays gone
    let later = t0 + Duration::seconds(301);
    assert!(coordinator.maintain(later).is_empty());
    assert!(coordinator.feature_bank().get(&stale).is_none());
    assert!(store.is_empty());
}
