//! Bit vectors of options for wire-protocol operations.

bitflags! {
    /// Represents the bit vector of options for an OP_REPLY message.
    pub struct OpReplyFlags: i32 {
        const CURSOR_NOT_FOUND  = 0b0001;
        const QUERY_FAILURE     = 0b0010;
        const SHARD_CONFIG_STALE = 0b0100;
        const AWAIT_CAPABLE     = 0b1000;
    }
}

bitflags! {
    /// Represents the bit vector of options for an OP_UPDATE message.
    pub struct OpUpdateFlags: i32 {
        const UPSERT       = 0b01;
        const MULTI_UPDATE = 0b10;
    }
}

bitflags! {
    /// Represents the bit vector of options for an OP_INSERT message.
    pub struct OpInsertFlags: i32 {
        const CONTINUE_ON_ERROR = 0b1;
    }
}

bitflags! {
    /// Represents the bit vector of options for an OP_QUERY message.
    pub struct OpQueryFlags: i32 {
        const TAILABLE_CURSOR   = 0b0000_0010;
        const SLAVE_OK          = 0b0000_0100;
        const OPLOG_REPLAY      = 0b0000_1000;
        const NO_CURSOR_TIMEOUT = 0b0001_0000;
        const AWAIT_DATA        = 0b0010_0000;
        const EXHAUST           = 0b0100_0000;
        const PARTIAL           = 0b1000_0000;
    }
}

bitflags! {
    /// Represents the bit vector of options for an OP_DELETE message.
    pub struct OpRemoveFlags: i32 {
        const SINGLE_REMOVE = 0b1;
    }
}

bitflags! {
    /// Represents the bit vector of options for an OP_MSG message.
    pub struct OpMsgFlags: u32 {
        const CHECKSUM_PRESENT = 0b01;
        const MORE_TO_COME     = 0b10;
        const EXHAUST_ALLOWED  = 0b1_0000_0000_0000_0000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_flag_bits() {
        assert_eq!(OpReplyFlags::CURSOR_NOT_FOUND.bits(), 1);
        assert_eq!(OpReplyFlags::QUERY_FAILURE.bits(), 2);
        assert_eq!(OpReplyFlags::SHARD_CONFIG_STALE.bits(), 4);
        assert_eq!(OpReplyFlags::AWAIT_CAPABLE.bits(), 8);

        let flags = OpReplyFlags::from_bits_truncate(0b1010);
        assert!(flags.contains(OpReplyFlags::QUERY_FAILURE));
        assert!(flags.contains(OpReplyFlags::AWAIT_CAPABLE));
        assert!(!flags.contains(OpReplyFlags::CURSOR_NOT_FOUND));
    }

    #[test]
    fn query_flag_bits() {
        assert_eq!(OpQueryFlags::TAILABLE_CURSOR.bits(), 2);
        assert_eq!(OpQueryFlags::AWAIT_DATA.bits(), 32);
        assert_eq!(OpQueryFlags::empty().bits(), 0);
    }
}
