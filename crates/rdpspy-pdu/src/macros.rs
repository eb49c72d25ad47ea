//! Encoding/decoding helper macros.
//!
//! The error constructors default their context to `Self::NAME`, so the
//! short forms only work inside an impl block of a named PDU; pass the
//! context explicitly everywhere else.

/// Bails out with a `NotEnoughBytes` error when fewer than `size` bytes are
/// left in the cursor.
#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let available = $buf.len();
        let needed = $expected;
        if available < needed {
            return Err(<$crate::PduError as $crate::PduErrorExt>::not_enough_bytes($ctx, available, needed));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

/// `ensure_size!` for the fixed part of the surrounding PDU type.
#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

/// Builds a `PduError` with `InvalidMessage` kind.
#[macro_export]
macro_rules! invalid_message_err {
    ( $context:expr, $field:expr , $reason:expr $(,)? ) => {{
        <$crate::PduError as $crate::PduErrorExt>::invalid_message($context, $field, $reason)
    }};
    ( $field:expr , $reason:expr $(,)? ) => {{
        invalid_message_err!(Self::NAME, $field, $reason)
    }};
}

/// Builds a `PduError` with `UnexpectedMessageType` kind.
#[macro_export]
macro_rules! unexpected_message_type_err {
    ( $context:expr, $got:expr $(,)? ) => {{
        <$crate::PduError as $crate::PduErrorExt>::unexpected_message_type($context, $got)
    }};
    ( $got:expr $(,)? ) => {{
        unexpected_message_type_err!(Self::NAME, $got)
    }};
}

/// Builds a `PduError` with `UnsupportedVersion` kind.
#[macro_export]
macro_rules! unsupported_version_err {
    ( $context:expr, $got:expr $(,)? ) => {{
        <$crate::PduError as $crate::PduErrorExt>::unsupported_version($context, $got)
    }};
    ( $got:expr $(,)? ) => {{
        unsupported_version_err!(Self::NAME, $got)
    }};
}

/// Builds a `PduError` with `UnsupportedValue` kind.
#[macro_export]
macro_rules! unsupported_value_err {
    ( $context:expr, $name:expr, $value:expr $(,)? ) => {{
        <$crate::PduError as $crate::PduErrorExt>::unsupported_value($context, $name, $value)
    }};
    ( $name:expr, $value:expr $(,)? ) => {{
        unsupported_value_err!(Self::NAME, $name, $value)
    }};
}

/// Fallible integer narrowing with an `InvalidMessage` error on overflow.
#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        $len.try_into()
            .map_err(|_| <$crate::PduError as $crate::PduErrorExt>::invalid_message($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(Self::NAME, $field, $len)
    }};
}

#[macro_export]
macro_rules! read_padding {
    ($src:expr, $n:expr) => {{
        let _ = $src.read_slice($n);
    }};
}

#[macro_export]
macro_rules! write_padding {
    ($dst:expr, $n:expr) => {{
        for _ in 0..$n {
            $dst.write_u8(0);
        }
    }};
}

/// Compile-time check that a trait stays object-safe.
#[macro_export]
macro_rules! assert_obj_safe {
    ($($trait_:path),+ $(,)?) => {
        $(const _: Option<&dyn $trait_> = None;)+
    };
}
