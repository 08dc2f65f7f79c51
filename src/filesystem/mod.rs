mod fs;
pub mod binding;
pub mod validation;
mod canonicalization;
mod translation;
mod substitution;
mod initialization;
pub mod pathutils;
pub mod auditor;
pub mod child;

pub use self::fs::FileSystem;
pub use self::translation::Translator;
pub use self::canonicalization::Canonicalizer;
pub use self::substitution::Substitutor;
pub use self::initialization::Initialiser;
pub use self::auditor::FdAuditor;
pub use self::child::ChildId;
