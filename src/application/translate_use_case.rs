// ============================================================
// Layer 2 — TranslateUseCase
// ============================================================
// Locates the checkpoint directory of a training run and
// translates sentences with its latest checkpoint.
//
//   checkpoints_dir/model_dir  → train_config.json
//                              → tokenizer_<lang>.json
//                              → <basename>_<epoch>.ckpt (newest)

use anyhow::Result;

use crate::domain::traits::SentenceTranslator;
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::translator::Translator;

pub struct TranslateUseCase {
    translator: Translator,
}

impl TranslateUseCase {
    /// `beam_size` overrides the beam width used during training.
    pub fn new(
        checkpoints_dir: &str,
        model_dir:       &str,
        model_basename:  &str,
        beam_size:       Option<usize>,
    ) -> Result<Self> {
        let store      = CheckpointStore::new(checkpoints_dir, model_dir, model_basename, 0)?;
        let translator = Translator::from_checkpoint(&store, beam_size)?;
        Ok(Self { translator })
    }
}

impl SentenceTranslator for TranslateUseCase {
    fn translate(&self, sentence: &str) -> Result<String> {
        if sentence.trim().is_empty() {
            return Ok(String::new());
        }
        self.translator.translate(sentence)
    }
}
