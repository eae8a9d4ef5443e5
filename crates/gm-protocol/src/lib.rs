pub mod error;
pub mod invocation;
pub mod matching;
pub mod records;
pub mod resource;
pub mod window;

pub use error::*;
pub use invocation::*;
pub use matching::*;
pub use records::*;
pub use resource::*;
pub use window::*;
