pub mod entry;
pub mod ticket;

pub use entry::Entry;
pub use ticket::{
    clamp_ticket_duration, CacheKey, Ticket, TicketHandle, DEFAULT_TICKET_DURATION_SECS,
    MAX_TICKET_DURATION_SECS,
};
