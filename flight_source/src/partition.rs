use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::location::Location;

/// Opaque, service-issued identifier of one result subset.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket(Vec<u8>);

impl Ticket {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Ticket(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&Ticket> for arrow_flight::Ticket {
    fn from(ticket: &Ticket) -> Self {
        arrow_flight::Ticket {
            ticket: Bytes::copy_from_slice(&ticket.0),
        }
    }
}

impl From<arrow_flight::Ticket> for Ticket {
    fn from(ticket: arrow_flight::Ticket) -> Self {
        Ticket(ticket.ticket.to_vec())
    }
}

/// One unit of read work: a ticket plus the servers where it can be redeemed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionDescriptor {
    ticket: Ticket,
    locations: Vec<Location>,
}

impl PartitionDescriptor {
    pub fn new(ticket: Ticket, locations: Vec<Location>) -> Self {
        Self { ticket, locations }
    }

    pub fn ticket(&self) -> &Ticket {
        &self.ticket
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }
}
