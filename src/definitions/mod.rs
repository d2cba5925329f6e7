pub mod ticket;
pub mod ticket_id;
pub mod ticket_state;
