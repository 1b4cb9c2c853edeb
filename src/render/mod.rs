//! Response-shaping collaborators used by file and template routes.
//!
//! # Data Flow
//! ```text
//! handler result + route hints
//!     → template.rs (route has a template: render with the result as context)
//!     → files.rs (route is in file mode: open the named file under the
//!       request's working directory)
//!     → dispatcher wraps the output in a Response
//! ```

pub mod files;
pub mod template;

pub use files::{safe_join, FileResolver, FsResolver, ResolvedFile};
pub use template::{PlaceholderRenderer, TemplateError, TemplateRenderer};
