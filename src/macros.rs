//! Useful macros.

/// Autoimplement wire messages.
///
/// Each entry declares a message struct, binds it to its [`MessageType`]
/// tag and derives the field-by-field [`Readable`]/[`Writable`] impls in
/// payload order.
///
/// [`MessageType`]: crate::protocol::MessageType
/// [`Readable`]: crate::protocol::Readable
/// [`Writable`]: crate::protocol::Writable
macro_rules! messages {
    (
        $(
            $(#[$attr:meta])*
            ($kind:ident) $name:ident {
                $(
                    $(#[$field_attr:meta])*
                    $field_name:ident: $field_type:ty,
                )*
            }
        )*
    ) => {
        $(
            $(#[$attr])*
            #[derive(Debug, PartialEq, Clone)]
            pub struct $name {
                $(
                    $(#[$field_attr])*
                    pub $field_name: $field_type,
                )*
            }

            impl $crate::protocol::Message for $name {
                const KIND: $crate::protocol::MessageType =
                    $crate::protocol::MessageType::$kind;
            }

            impl $crate::protocol::Readable for $name {
                #[inline]
                #[allow(unused_variables)]
                fn read_from<__T: std::io::Read>(buf: &mut __T) -> $crate::ChessdResult<Self> {
                    Ok(Self {
                        $(
                            $field_name: <$field_type>::read_from(buf)?,
                        )*
                    })
                }
            }

            impl $crate::protocol::Writable for $name {
                #[inline]
                #[allow(unused_variables)]
                fn write_to<__T: std::io::Write>(&self, buf: &mut __T) -> $crate::ChessdResult<()> {
                    $(
                        self.$field_name.write_to(buf)?;
                    )*
                    Ok(())
                }
            }
        )*
    };
}
