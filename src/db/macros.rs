//! Provider dispatch macros.
//!
//! `Provider` wraps one concrete provider per engine. These macros expand to
//! the `match` that forwards a call to whichever engine is inside, so each
//! forwarding method stays a single line.

/// Macro for generating provider dispatch match arms.
///
/// The short form applies the same body to every engine:
///
/// ```ignore
/// impl_provider_dispatch!(self, p => p.execute_non_query(sql, params).await)
/// ```
///
/// The long form spells out one arm per engine:
///
/// ```ignore
/// impl_provider_dispatch!(provider, {
///     MySql(p) => do_mysql(p),
///     MsSql(p) => do_mssql(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_provider_dispatch {
    ($provider:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $provider {
            $(
                $crate::db::provider::Provider::$variant($p) => $body,
            )+
        }
    };
    ($provider:expr, $p:ident => $body:expr) => {
        match $provider {
            $crate::db::provider::Provider::MySql($p) => $body,
            $crate::db::provider::Provider::MsSql($p) => $body,
        }
    };
}

pub use impl_provider_dispatch;
