// Transport seams, query correlation and the order-details codec.

pub mod correlator;
pub mod order;
pub mod transport;

pub use correlator::{generate_request_id, QueryCorrelator};
pub use order::{build_order_query, fetch_order_details, OrderDetails, OrderProduct};
pub use transport::{
    ContactDirectory, ContactInfo, GroupInfo, MediaFetcher, MediaUploader, MessageSender,
    NodeSender, OfflineTransport, SendReceipt, Transport, UploadedMedia,
};
