//! Order-details query: request framing and response parsing.

use serde::{Deserialize, Serialize};

use chatbridge_shared::constants::{
    ORDER_LINE_PREFIX, ORDER_QUERY_NAMESPACE, ORDER_QUERY_SMAX_ID, USER_SERVER,
};
use chatbridge_shared::protocol::{InfoQuery, QueryType};
use chatbridge_shared::{Jid, Node, QueryError};

use crate::correlator::QueryCorrelator;
use crate::transport::NodeSender;

const THUMBNAIL_SIZE: &str = "100";

/// Build the `iq` asking the server for the contents of an order.
pub fn build_order_query(order_id: &str, token: &str) -> InfoQuery {
    let dimensions = Node::new("image_dimensions").with_children(vec![
        Node::new("width").with_bytes(THUMBNAIL_SIZE),
        Node::new("height").with_bytes(THUMBNAIL_SIZE),
    ]);
    let order = Node::new("order")
        .with_attr("op", "get")
        .with_attr("id", order_id)
        .with_children(vec![dimensions, Node::new("token").with_bytes(token)]);

    let mut query = InfoQuery::new(ORDER_QUERY_NAMESPACE, QueryType::Get);
    query.to = Some(Jid::new(USER_SERVER));
    query.smax_id = Some(ORDER_QUERY_SMAX_ID.to_string());
    query.content = vec![order];
    query
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderProduct {
    pub id: Option<String>,
    pub name: String,
    pub quantity: String,
    pub price: Option<String>,
    pub currency: Option<String>,
}

/// Products listed in an order-details response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order_id: Option<String>,
    pub products: Vec<OrderProduct>,
}

impl OrderDetails {
    /// Parse the response `iq`.  Products without a name are dropped and a
    /// missing quantity counts as one.
    pub fn from_response(response: &Node) -> Self {
        let order = if response.tag == "order" {
            Some(response)
        } else {
            response.child("order")
        };
        let Some(order) = order else {
            return Self::default();
        };

        let products = order
            .children()
            .iter()
            .filter(|child| child.tag == "product")
            .filter_map(parse_product)
            .collect();

        Self {
            order_id: order.attr("id").map(str::to_string),
            products,
        }
    }

    /// One human-readable line, or `""` when the order lists no product.
    pub fn format_line(&self) -> String {
        if self.products.is_empty() {
            return String::new();
        }
        let items: Vec<String> = self
            .products
            .iter()
            .map(|p| format!("{} x{}", p.name, p.quantity))
            .collect();
        format!("{ORDER_LINE_PREFIX}{}", items.join(", "))
    }
}

fn parse_product(node: &Node) -> Option<OrderProduct> {
    let field = |tag: &str| node.child(tag).and_then(Node::text).filter(|s| !s.is_empty());

    let name = field("name")?;
    Some(OrderProduct {
        id: field("id"),
        name,
        quantity: field("quantity").unwrap_or_else(|| "1".to_string()),
        price: field("price"),
        currency: field("currency"),
    })
}

/// Query the server for an order and parse the answer.
pub async fn fetch_order_details<S: NodeSender + ?Sized>(
    correlator: &QueryCorrelator<S>,
    order_id: &str,
    token: &str,
) -> Result<OrderDetails, QueryError> {
    let response = correlator.send(build_order_query(order_id, token)).await?;
    Ok(OrderDetails::from_response(&response))
}
