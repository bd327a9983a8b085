use bitflags::bitflags;

bitflags! {
    /// Symbol attribute bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Attributes: u32 {
        /// Values and rules may not be changed
        const PROTECTED = 1 << 0;
        const HOLD_FIRST = 1 << 1;
        const HOLD_REST = 1 << 2;
        const HOLD_ALL = Self::HOLD_FIRST.bits() | Self::HOLD_REST.bits();
        const SYMMETRIC = 1 << 3;
        const ASSOCIATIVE = 1 << 4;
        const N_HOLD_FIRST = 1 << 5;
        const N_HOLD_REST = 1 << 6;
        const N_HOLD_ALL = Self::N_HOLD_FIRST.bits() | Self::N_HOLD_REST.bits();
        /// Reclaimed from the table once the last handle is dropped
        const TEMPORARY = 1 << 7;
        const LISTABLE = 1 << 8;
        const DEEP_HOLD_ALL = 1 << 9;
        const HOLD_ALL_COMPLETE = 1 << 10;
        const ONE_IDENTITY = 1 << 11;
        /// Value and rules are private to each thread context
        const THREAD_LOCAL = 1 << 12;
        const NUMERIC_FUNCTION = 1 << 13;
        const READ_PROTECTED = 1 << 14;
        const SEQUENCE_HOLD = 1 << 15;
        /// Logically deleted; hidden from lookup and enumeration
        const REMOVED = 1 << 16;
    }
}
