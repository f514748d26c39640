//! Rule-based URL rewriting engine.
//!
//! Rules pair a condition tree with operations:
//!
//! - Path, header, method and dispatcher-type conditions with `{name}` placeholders
//! - Per-parameter regex constraints, transforms, converters and validators
//! - Deferred binding: values are converted and validated for the whole rule
//!   before any of them is bound
//! - Forward, include, redirect and response header/status/cookie operations
//! - Declarative YAML/JSON rule files
//!
//! ## Configuration Example
//!
//! ```yaml
//! rules:
//!   - id: "legacy-product"
//!     match:
//!       path: "/product.php/{id}"
//!     where:
//!       id: { matches: "\\d+", converter: integer }
//!     perform:
//!       redirect: { location: "/products/#{id}", permanent: true }
//! ```
//!
//! ## Programmatic rules
//!
//! ```
//! use rewrite_engine::condition::Path;
//! use rewrite_engine::operation::Forward;
//! use rewrite_engine::param::ParameterBuilder;
//! use rewrite_engine::rule::RuleBuilder;
//! use rewrite_engine::event::{HttpRewrite, RequestInfo, ResponseInfo, Rewrite, RewriteState};
//!
//! let mut builder = RuleBuilder::define("blog")
//!     .when(Path::matches("/blog/{year}/{slug}")?)
//!     .perform(Forward::to("/posts?year={year}&slug={slug}")?);
//! builder.where_param("year")?.matches("\\d{4}")?;
//! let rule = builder.build()?;
//!
//! let mut event = HttpRewrite::new(RequestInfo::new("GET", "/blog/2024/hello"), ResponseInfo::new());
//! assert!(rule.apply(&mut event)?);
//! assert_eq!(
//!     event.state(),
//!     &RewriteState::Forwarded("/posts?year=2024&slug=hello".to_string())
//! );
//! # Ok::<(), rewrite_engine::RewriteError>(())
//! ```

pub mod bind;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod event;
pub mod operation;
pub mod param;
pub mod rule;

pub use config::RewriteConfig;
pub use context::EvaluationContext;
pub use engine::{EngineError, EngineStats, RewriteEngine};
pub use error::RewriteError;
pub use event::{HttpRewrite, RequestInfo, ResponseInfo, Rewrite, RewriteState};
pub use rule::{Configuration, Rule, RuleBuilder};
