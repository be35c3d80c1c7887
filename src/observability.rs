// In: src/observability.rs

//! This module provides observability and diagnostics capabilities for the
//! sampling scheduler.
//!
//! The multiplexer's behavior is stochastic by design, which makes it hard
//! to see why a particular run starved a source or churned its working set.
//! This module provides structured logging hooks to make slot turnover
//! transparent and debuggable. The `log_metric!` macro is the primary tool.
//!
//! It is a zero-cost abstraction: the `#[cfg(debug_assertions)]` attribute
//! ensures that the macro and all calls to it are completely compiled out of
//! release builds, imposing no performance penalty in production.

/// Logs a structured key-value metric string to stdout, only in debug builds.
///
/// # Example
/// ```
/// use minibench_core::log_metric;
/// let produced = 4;
/// log_metric!("event"="slot_retired", "produced"=&produced);
/// ```
#[macro_export]
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            // Collect each pair as a JSON string fragment
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+

            let output = format!("MINIBENCH_METRIC: {{ {} }}", parts.join(", "));
            println!("{}", output);
        }
    };
}
