/// One priced component of a vendor subscription, reduced to the fields
/// entitlement rules look at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionLineItem {
    pub item_id: String,
    pub product_id: String,
    pub lookup_key: Option<String>,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSubscription {
    pub id: String,
    /// Raw `organizationId` from the subscription metadata, if any.
    pub organization_id: Option<String>,
    pub default_payment_method: Option<String>,
    pub items: Vec<SubscriptionLineItem>,
}

pub fn find_item_by_lookup_key<'a>(
    items: &'a [SubscriptionLineItem],
    lookup_key: &str,
) -> Option<&'a SubscriptionLineItem> {
    items
        .iter()
        .find(|item| item.lookup_key.as_deref() == Some(lookup_key))
}
