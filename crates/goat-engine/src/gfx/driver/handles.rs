use std::fmt;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        pub struct $name(pub(crate) u32);

        impl $name {
            pub(crate) const KIND: &'static str = $kind;

            /// Raw driver-side value.
            pub fn raw(self) -> u32 {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", $kind, self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

handle!(
    /// Compiled shader stage.
    ShaderId,
    "shader"
);
handle!(
    /// Shader program.
    ProgramId,
    "program"
);
handle!(BufferId, "buffer");
handle!(VertexArrayId, "vertex array");
handle!(TextureId, "texture");
handle!(
    /// Location of an active uniform inside one program.
    UniformLocation,
    "uniform"
);

/// Monotonic handle allocator. Zero is never handed out.
#[derive(Debug, Default)]
pub(crate) struct HandleCounter(std::cell::Cell<u32>);

impl HandleCounter {
    pub(crate) fn next(&self) -> u32 {
        let id = self.0.get() + 1;
        self.0.set(id);
        id
    }
}
