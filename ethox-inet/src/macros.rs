// The enum pattern follows smoltcp, Copyright (C) 2016 whitequark@whitequark.org

/// A fieldless enum over numeric codes of the socket interface that keeps unknown values.
///
/// Converts losslessly from and into the code type, so a code passed in by a caller can be matched
/// on and still be handed on untouched when it is not one of the named ones.
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $( $( #[$variant_attr:meta] )* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
        $( #[$enum_attr] )*
        pub enum $name {
            $( $( #[$variant_attr] )* $variant, )+
            /// A code without a name.
            Unknown($ty),
        }

        impl From<$ty> for $name {
            fn from(code: $ty) -> Self {
                match code {
                    $( $value => $name::$variant, )+
                    other => $name::Unknown(other),
                }
            }
        }

        impl From<$name> for $ty {
            fn from(code: $name) -> Self {
                match code {
                    $( $name::$variant => $value, )+
                    $name::Unknown(other) => other,
                }
            }
        }
    }
}

// Logging goes through `log` when the feature is enabled. Without it the arguments are still
// evaluated by reference, so a disabled build does not warn about unused bindings.
#[cfg(feature = "log")]
macro_rules! net_log {
    ($level:ident, $($arg:tt)+) => {
        ::log::log!(::log::Level::$level, $($arg)+)
    };
}

#[cfg(not(feature = "log"))]
macro_rules! net_log {
    ($level:ident, $($arg:expr),+ $(,)?) => {{ $( let _ = &$arg; )+ }};
}

macro_rules! net_trace {
    ($($arg:tt)+) => (net_log!(Trace, $($arg)+));
}

macro_rules! net_debug {
    ($($arg:tt)+) => (net_log!(Debug, $($arg)+));
}

macro_rules! net_warn {
    ($($arg:tt)+) => (net_log!(Warn, $($arg)+));
}

macro_rules! net_error {
    ($($arg:tt)+) => (net_log!(Error, $($arg)+));
}
