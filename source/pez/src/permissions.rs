use bitflags::bitflags;

bitflags! {
    /// Which side-effecting primitive categories an instance may use.
    ///
    /// Gated words check their bit before touching any stack, so a rejected
    /// call leaves the instance exactly as it was.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u32 {
        /// Console and stream I/O, including redirection.
        const IO = 1 << 0;
        /// File access. Implies `IO`.
        const FILES = (1 << 1) | Self::IO.bits();
        const SIG = 1 << 2;
        const PROCESS = 1 << 3;
        /// Loading native libraries and calling native words.
        const FFI = 1 << 4;
        const SOCKET = 1 << 5;
        /// Running shell commands.
        const SYSTEM = 1 << 6;
        /// Access to heap memory that has not been allocated yet, and to the
        /// process environment.
        const POINTERS = 1 << 7;
        /// Creating child instances.
        const SPAWN = 1 << 8;
        const EVERYTHING = Self::FILES.bits()
            | Self::SIG.bits()
            | Self::PROCESS.bits()
            | Self::FFI.bits()
            | Self::SOCKET.bits()
            | Self::SYSTEM.bits()
            | Self::POINTERS.bits()
            | Self::SPAWN.bits();
    }
}

#[cfg(test)]
pub mod test {
    use super::Permissions;

    #[test]
    fn files_implies_io() {
        assert!(Permissions::FILES.contains(Permissions::IO));
        assert!(!Permissions::IO.contains(Permissions::FILES));
        assert!(Permissions::EVERYTHING.contains(Permissions::SPAWN | Permissions::FILES));
        assert_eq!(Permissions::EVERYTHING, Permissions::all());
    }
}
