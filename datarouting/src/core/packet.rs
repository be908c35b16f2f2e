use serde::{Deserialize, Serialize};
use std::fmt;

/// Delivery status of a packet.
///
/// Variants are declared in lifecycle order; a packet's status only ever
/// moves toward `Delivered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PacketStatus {
    /// Submitted, nothing decided yet.
    #[serde(rename = "STATUS_PENDING")]
    Pending,
    /// Not delivered and no provider is left (or none chosen yet).
    #[serde(rename = "STATUS_NO_ROUTE")]
    NoRoute,
    /// A provider confirmed delivery.
    #[serde(rename = "STATUS_DELIVERED")]
    Delivered,
}

impl PacketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketStatus::Pending => "STATUS_PENDING",
            PacketStatus::NoRoute => "STATUS_NO_ROUTE",
            PacketStatus::Delivered => "STATUS_DELIVERED",
        }
    }
}

impl fmt::Display for PacketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of data being routed to a destination.
///
/// Identity and payload are fixed at construction. The routing fields are
/// mutated only by the delivery state machine that owns the packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    id: String,
    source: String,
    destination: String,
    contents: Vec<u8>,
    failed_providers: Vec<String>,
    current_provider: String,
    status: PacketStatus,
}

impl Packet {
    /// Creates a packet that has not been routed yet (`STATUS_NO_ROUTE`).
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            destination: destination.into(),
            contents: contents.into(),
            failed_providers: Vec::new(),
            current_provider: String::new(),
            status: PacketStatus::NoRoute,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    /// Providers already attempted and failed, in attempt order.
    pub fn failed_providers(&self) -> &[String] {
        &self.failed_providers
    }

    /// The provider currently being attempted, or `""` when none is active.
    pub fn current_provider(&self) -> &str {
        &self.current_provider
    }

    pub fn status(&self) -> PacketStatus {
        self.status
    }

    pub fn is_delivered(&self) -> bool {
        self.status == PacketStatus::Delivered
    }

    /// Number of distinct providers that failed for this packet.
    pub fn attempts(&self) -> usize {
        self.failed_providers.len()
    }

    /// Makes `provider` the active provider.
    ///
    /// A provider that already failed is never made current again; the call
    /// is ignored and `false` is returned.
    pub(crate) fn set_current_provider(&mut self, provider: impl Into<String>) -> bool {
        let provider = provider.into();
        if self.failed_providers.iter().any(|p| *p == provider) {
            return false;
        }
        self.current_provider = provider;
        true
    }

    /// Moves the active provider to the failed list and clears it.
    ///
    /// Returns the provider that was recorded, if one was active and not
    /// already recorded.
    pub(crate) fn record_failure(&mut self) -> Option<String> {
        let provider = std::mem::take(&mut self.current_provider);
        if provider.is_empty() || self.failed_providers.contains(&provider) {
            return None;
        }
        self.failed_providers.push(provider.clone());
        Some(provider)
    }

    pub(crate) fn mark_delivered(&mut self) {
        self.advance(PacketStatus::Delivered);
    }

    /// Marks the packet as having no route left and clears the active provider.
    pub(crate) fn mark_no_route(&mut self) {
        if self.advance(PacketStatus::NoRoute) {
            self.current_provider.clear();
        }
    }

    /// Moves `status` forward. Backward moves are ignored; returns whether the
    /// packet now holds `next`.
    fn advance(&mut self, next: PacketStatus) -> bool {
        if next >= self.status {
            self.status = next;
            true
        } else {
            false
        }
    }
}
