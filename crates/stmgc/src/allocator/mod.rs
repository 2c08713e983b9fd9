//! Allocator Module - Arena and Promotion Allocation
//!
//! ## Allocation Strategies
//!
//! - **Arena**: bump pointer over a reserved address range; backs the
//!   shared heap and every worker nursery
//! - **Promotion Buffer**: page-granular chunks of the shared arena,
//!   used only while a commit promotes objects

pub mod arena;
pub mod promotion;

pub use arena::Arena;
pub use promotion::PromotionBuffer;
