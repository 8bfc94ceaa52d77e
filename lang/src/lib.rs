//! Anonymous functions from expression text, and the higher-order and
//! immutable collection operations built on them.
//!
//! ```
//! use lambdakit::{Env, Value};
//!
//! let env = Env::new();
//! let total = env
//!     .reduce("acc + val", Value::Integer(0), &Value::from(vec![1_i64, 2, 3]))
//!     .unwrap();
//! assert_eq!(total, Some(Value::Integer(6)));
//! assert_eq!(env.live_units(), 0);
//! ```

pub mod error;
pub mod lambda;
pub mod lexer;
pub mod ops;
pub mod parser;
pub mod vm;

pub use error::{LambdaError, UsageError};
pub use lambda::{Env, Lambda, Param};
pub use ops::{Callable, Shape};
pub use vm::Value;
