//! Scripted capabilities for pipeline tests
//!
//! A tagged sample is a short constant signal whose first i16 value selects a
//! scripted list of frame scores. The frame model scores each frame as its own
//! first value, so tests control log-likelihoods exactly.

use crate::audio::{Pcm, RawAudio, ANALYSIS_SAMPLE_RATE};
use crate::capabilities::{
    BackgroundModelRef, FeatureExtractor, FeatureSet, LivenessClassifier, LivenessPrediction,
    LivenessVerdict, ModelTrainer, VoiceModel,
};
use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

const FRAME_MODEL_BYTES: &[u8] = b"frame-model";

/// Constant signal at the analysis rate whose normalized value is `tag`
pub fn tagged(tag: i16) -> RawAudio {
    RawAudio::mono(vec![tag as f32 / 32768.0; 64], ANALYSIS_SAMPLE_RATE)
}

#[derive(Default)]
pub struct ScriptedExtractor {
    table: Mutex<HashMap<i16, Vec<f64>>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl ScriptedExtractor {
    pub fn script(&self, tag: i16, frame_scores: &[f64]) {
        self.table
            .lock()
            .unwrap()
            .insert(tag, frame_scores.to_vec());
    }
}

impl FeatureExtractor for ScriptedExtractor {
    fn extract(&self, pcm: &Pcm) -> Result<FeatureSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            bail!("extractor offline");
        }

        let Some(&tag) = pcm.samples.first() else {
            return Ok(FeatureSet::default());
        };
        let frames = self
            .table
            .lock()
            .unwrap()
            .get(&tag)
            .map(|scores| scores.iter().map(|&s| vec![s]).collect())
            .unwrap_or_default();
        Ok(FeatureSet::new(frames))
    }
}

/// Scores each frame as its first component
pub struct FrameModel;

impl VoiceModel for FrameModel {
    fn score_each(&self, features: &FeatureSet) -> Result<Vec<f64>> {
        Ok(features.frames().iter().map(|f| f[0]).collect())
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(FRAME_MODEL_BYTES.to_vec())
    }
}

#[derive(Default)]
pub struct ScriptedTrainer {
    pub fail: AtomicBool,
    pub trained: AtomicUsize,
    pub loads: AtomicUsize,
    pub last_components: AtomicUsize,
}

impl ModelTrainer for ScriptedTrainer {
    fn train(
        &self,
        _features: &FeatureSet,
        _background: &BackgroundModelRef,
        components: usize,
    ) -> Result<Box<dyn VoiceModel>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("EM did not converge");
        }
        self.trained.fetch_add(1, Ordering::SeqCst);
        self.last_components.store(components, Ordering::SeqCst);
        Ok(Box::new(FrameModel))
    }

    fn load(&self, bytes: &[u8]) -> Result<Box<dyn VoiceModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if bytes != FRAME_MODEL_BYTES {
            bail!("unreadable model blob");
        }
        Ok(Box::new(FrameModel))
    }
}

/// Liveness classifier with a fixed answer
pub enum ScriptedLiveness {
    Verdict(LivenessPrediction),
    NoVerdict,
    Broken,
}

impl LivenessClassifier for ScriptedLiveness {
    fn classify(&self, _pcm: &Pcm, cutoff_hz: u32) -> Result<Option<LivenessVerdict>> {
        assert_eq!(cutoff_hz, 4000);
        match self {
            ScriptedLiveness::Verdict(prediction) => Ok(Some(LivenessVerdict {
                prediction: *prediction,
                confidence: 0.97,
            })),
            ScriptedLiveness::NoVerdict => Ok(None),
            ScriptedLiveness::Broken => bail!("classifier model missing"),
        }
    }
}

pub fn frame_model_bytes() -> Vec<u8> {
    FRAME_MODEL_BYTES.to_vec()
}
