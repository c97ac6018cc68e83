//! Well-known CTF constants and reserved field names

/// Magic number at the start of every packet header (`magic` field)
pub const CTF_MAGIC: u32 = 0xC1FC_1FC1;

/// Length in bytes of a trace UUID (`uuid` field, array of 16 x u8)
pub const UUID_LEN: usize = 16;

/// Packet header field names
pub mod packet_header {
    pub const MAGIC: &str = "magic";
    pub const UUID: &str = "uuid";
    pub const STREAM_ID: &str = "stream_id";
}

/// Packet context field names
pub mod packet_context {
    pub const CONTENT_SIZE: &str = "content_size";
    pub const PACKET_SIZE: &str = "packet_size";
    pub const TIMESTAMP_BEGIN: &str = "timestamp_begin";
    pub const TIMESTAMP_END: &str = "timestamp_end";
    pub const EVENTS_DISCARDED: &str = "events_discarded";
    pub const PACKET_SEQ_NUM: &str = "packet_seq_num";
}

/// Event header field names
pub mod event_header {
    pub const ID: &str = "id";
    pub const TIMESTAMP: &str = "timestamp";
}

/// Lost event naming
pub mod lost_event {
    pub const NAME: &str = "Lost event";
    pub const COUNT_FIELD: &str = "Lost events";
    pub const DURATION_FIELD: &str = "duration";
}
