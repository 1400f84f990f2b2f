// ============================================================
// Layer 5 — Translation Model
// ============================================================
// Two things live here:
//
//   Seq2Seq              — the contract the trainer and decoders
//                          rely on (encode / decode / project,
//                          device and pad ids). Nothing else about
//                          the network is assumed.
//
//   TranslationTransformer — the encoder-decoder transformer used
//                          by the CLI, built from Burn's transformer
//                          stacks with learned positional
//                          embeddings and a vocabulary head.
//
// Mask conventions follow Burn: `true` marks a position that
// must NOT be attended to (padding, or future tokens).
//
// Reference: Vaswani et al. (2017) Attention Is All You Need
//            Burn Book §3 (Building Blocks)

use burn::{
    nn::{
        attention::generate_autoregressive_mask,
        transformer::{
            TransformerDecoder, TransformerDecoderConfig, TransformerDecoderInput,
            TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput,
        },
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        Linear, LinearConfig,
    },
    prelude::*,
};

// ─── Model contract ───────────────────────────────────────────────────────────
/// What the training loop and the search procedures need from a
/// sequence-to-sequence model.
pub trait Seq2Seq<B: Backend> {
    /// source: [batch, src_len] → memory: [batch, src_len, d_model]
    fn encode(&self, source: Tensor<B, 2, Int>, source_pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3>;

    /// target: [batch, tgt_len] → hidden: [batch, tgt_len, d_model]
    fn decode(
        &self,
        memory:          Tensor<B, 3>,
        memory_pad_mask: Tensor<B, 2, Bool>,
        target:          Tensor<B, 2, Int>,
        causal_mask:     Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3>;

    /// hidden: [batch, len, d_model] → logits: [batch, len, target_vocab]
    fn project(&self, hidden: Tensor<B, 3>) -> Tensor<B, 3>;

    fn device(&self) -> B::Device;

    fn source_pad_id(&self) -> u32;

    fn target_pad_id(&self) -> u32;

    /// Teacher-forced pass over a whole batch:
    /// encode the source, decode the full decoder input under a
    /// causal mask, project to vocabulary logits.
    fn forward_logits(&self, source: Tensor<B, 2, Int>, target: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, tgt_len] = target.dims();
        let device = self.device();

        let source_mask = source.clone().equal_elem(self.source_pad_id() as i32);
        let memory      = self.encode(source, source_mask.clone());
        let causal      = generate_autoregressive_mask::<B>(batch_size, tgt_len, &device);

        let hidden = self.decode(memory, source_mask, target, causal);
        self.project(hidden)
    }
}

// ─── Configuration ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct TranslationTransformerConfig {
    pub src_vocab_size:    usize,
    pub target_vocab_size: usize,
    pub seq_length:        usize,
    pub src_pad_id:        u32,
    pub target_pad_id:     u32,
    #[config(default = 512)]
    pub d_model:           usize,
    #[config(default = 8)]
    pub num_heads:         usize,
    #[config(default = 6)]
    pub num_layers:        usize,
    #[config(default = 2048)]
    pub d_ffn:             usize,
    #[config(default = 0.1)]
    pub dropout:           f64,
}

impl TranslationTransformerConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> TranslationTransformer<B> {
        let src_embedding    = EmbeddingConfig::new(self.src_vocab_size, self.d_model).init(device);
        let target_embedding = EmbeddingConfig::new(self.target_vocab_size, self.d_model).init(device);
        // Positions are shared by both sides; the decoder may see one
        // token more than seq_length while generating (the [SOS]).
        let position_embedding = EmbeddingConfig::new(self.seq_length + 1, self.d_model).init(device);

        let encoder = TransformerEncoderConfig::new(self.d_model, self.d_ffn, self.num_heads, self.num_layers)
            .with_dropout(self.dropout)
            .init(device);
        let decoder = TransformerDecoderConfig::new(self.d_model, self.d_ffn, self.num_heads, self.num_layers)
            .with_dropout(self.dropout)
            .init(device);

        TranslationTransformer {
            src_embedding,
            target_embedding,
            position_embedding,
            encoder,
            decoder,
            output: LinearConfig::new(self.d_model, self.target_vocab_size).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            d_model: self.d_model,
            src_pad_id: self.src_pad_id,
            target_pad_id: self.target_pad_id,
        }
    }
}

// ─── Module ───────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct TranslationTransformer<B: Backend> {
    pub src_embedding:      Embedding<B>,
    pub target_embedding:   Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder:            TransformerEncoder<B>,
    pub decoder:            TransformerDecoder<B>,
    pub output:             Linear<B>,
    pub dropout:            Dropout,
    pub d_model:            usize,
    pub src_pad_id:         u32,
    pub target_pad_id:      u32,
}

impl<B: Backend> TranslationTransformer<B> {
    /// Scaled token embedding plus learned position embedding.
    fn embed(&self, table: &Embedding<B>, ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch_size, seq_len] = ids.dims();
        let tokens = table.forward(ids).mul_scalar((self.d_model as f64).sqrt());

        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tokens.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let positions = self.position_embedding.forward(positions);

        self.dropout.forward(tokens + positions)
    }
}

impl<B: Backend> Seq2Seq<B> for TranslationTransformer<B> {
    fn encode(&self, source: Tensor<B, 2, Int>, source_pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let x = self.embed(&self.src_embedding, source);
        self.encoder.forward(TransformerEncoderInput::new(x).mask_pad(source_pad_mask))
    }

    fn decode(
        &self,
        memory:          Tensor<B, 3>,
        memory_pad_mask: Tensor<B, 2, Bool>,
        target:          Tensor<B, 2, Int>,
        causal_mask:     Tensor<B, 3, Bool>,
    ) -> Tensor<B, 3> {
        let x = self.embed(&self.target_embedding, target);
        let input = TransformerDecoderInput::new(x, memory)
            .memory_mask_pad(memory_pad_mask)
            .target_mask_attn(causal_mask);
        self.decoder.forward(input)
    }

    fn project(&self, hidden: Tensor<B, 3>) -> Tensor<B, 3> {
        self.output.forward(hidden)
    }

    fn device(&self) -> B::Device {
        self.output.weight.device()
    }

    fn source_pad_id(&self) -> u32 { self.src_pad_id }

    fn target_pad_id(&self) -> u32 { self.target_pad_id }
}

/// A model small enough to train in unit tests:
/// 12 source / 10 target ids, seq_length 6, pad id 0.
#[cfg(test)]
pub(crate) fn tiny_config() -> TranslationTransformerConfig {
    TranslationTransformerConfig::new(12, 10, 6, 0, 0)
        .with_d_model(16)
        .with_num_heads(2)
        .with_num_layers(1)
        .with_d_ffn(32)
        .with_dropout(0.0)
}
