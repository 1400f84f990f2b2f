// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// a specific goal (training or translating).
//
// Rules for this layer:
//   - No tensor code here (that's Layer 5)
//   - No printing here (that's Layer 1)
//   - File access only through Layers 4 and 6
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// The translation workflow
pub mod translate_use_case;
