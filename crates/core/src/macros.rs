// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the control-plane crates.
//!
//! - [`simple_display!`] — `Display` as the name an operator sees in logs
//! - [`setters!`] — chainable setters for config structs
//! - [`builder!`] — test-only record builders over `Default` types

/// Implement `Display` as a variant-to-name table.
///
/// Lifecycle and wire enums log under short stable names rather than
/// their Rust identifiers. Data-carrying variants ignore their payload
/// with `(..)`.
///
/// ```ignore
/// crate::simple_display! {
///     Signal {
///         ShutDown => "shutdown",
///         User(..) => "user",
///     }
/// }
/// ```
#[macro_export]
macro_rules! simple_display {
    ($ty:ty { $( $variant:ident $(( $($skip:tt)* ))? => $name:literal ),+ $(,)? }) => {
        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let name = match self {
                    $( Self::$variant $(( $($skip)* ))? => $name, )+
                };
                f.write_str(name)
            }
        }
    };
}

/// Generate chainable setters inside a config's `impl` block.
///
/// `into` fields accept `impl Into<T>`; `set` fields take the type as is.
/// Configs here are plain structs with `Default` values, so the setters
/// are the whole construction story:
///
/// ```ignore
/// impl InstanceCtrlConfig {
///     fm_core::setters! {
///         into { node_id: String }
///         set { max_redeploy_times: u32 }
///     }
/// }
///
/// let config = InstanceCtrlConfig::default()
///     .node_id("local-a")
///     .max_redeploy_times(3);
/// ```
#[macro_export]
macro_rules! setters {
    (
        $(into { $( $into_field:ident : $into_ty:ty ),* $(,)? })?
        $(set { $( $set_field:ident : $set_ty:ty ),* $(,)? })?
    ) => {
        $($(
            pub fn $into_field(mut self, value: impl Into<$into_ty>) -> Self {
                self.$into_field = value.into();
                self
            }
        )*)?

        $($(
            pub fn $set_field(mut self, value: $set_ty) -> Self {
                self.$set_field = value;
                self
            }
        )*)?
    };
}

/// Generate a test builder for a `Default` record.
///
/// Only the listed fields get seeds and setters; `build()` fills the rest
/// from `Default`. Everything generated is gated behind
/// `#[cfg(any(test, feature = "test-support"))]` so production code never
/// sees it. Field groups are the same as [`setters!`], each with a test
/// default:
///
/// ```ignore
/// crate::builder! {
///     pub struct InstanceInfoBuilder => InstanceInfo {
///         into { instance_id: String = "ins-test" }
///         set { schedule_times: u32 = 2 }
///     }
/// }
///
/// let info = InstanceInfo::builder().instance_id("ins-1").build();
/// ```
#[macro_export]
macro_rules! builder {
    (
        pub struct $builder:ident => $target:ident {
            $(into { $( $into_field:ident : $into_ty:ty = $into_seed:expr ),* $(,)? })?
            $(set { $( $set_field:ident : $set_ty:ty = $set_seed:expr ),* $(,)? })?
        }
    ) => {
        #[cfg(any(test, feature = "test-support"))]
        pub struct $builder {
            $($( $into_field: $into_ty, )*)?
            $($( $set_field: $set_ty, )*)?
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $target {
            /// Builder seeded with test defaults.
            pub fn builder() -> $builder {
                $builder {
                    $($( $into_field: $into_seed.into(), )*)?
                    $($( $set_field: $set_seed, )*)?
                }
            }
        }

        #[cfg(any(test, feature = "test-support"))]
        impl $builder {
            $($(
                pub fn $into_field(mut self, value: impl Into<$into_ty>) -> Self {
                    self.$into_field = value.into();
                    self
                }
            )*)?

            $($(
                pub fn $set_field(mut self, value: $set_ty) -> Self {
                    self.$set_field = value;
                    self
                }
            )*)?

            pub fn build(self) -> $target {
                $target {
                    $($( $into_field: self.$into_field, )*)?
                    $($( $set_field: self.$set_field, )*)?
                    ..Default::default()
                }
            }
        }
    };
}
