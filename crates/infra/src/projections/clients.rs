use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use gescom_clients::{Client, ClientType, ContactInfo};
use gescom_core::{ClientId, DomainError, TenantId};
use gescom_events::EventEnvelope;

use super::aggregate_state::AggregateStateProjection;
use super::cursor::{Applied, ProjectionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientView {
    pub client_id: ClientId,
    pub display_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub client_type: ClientType,
    #[serde(flatten)]
    pub contact: ContactInfo,
    pub active: bool,
    pub registered_at: Option<DateTime<Utc>>,
}

impl ClientView {
    fn from_client(client: &Client) -> Result<Self, DomainError> {
        let details = client.details();
        Ok(Self {
            client_id: client.id_typed(),
            display_name: details.display_name(),
            first_name: details.first_name.clone(),
            last_name: details.last_name.clone(),
            company: details.company.clone(),
            client_type: details.client_type,
            contact: details.contact.clone(),
            active: client.is_active(),
            registered_at: client.registered_at(),
        })
    }
}

/// Narrows [`ClientsProjection::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub active: Option<bool>,
    pub client_type: Option<ClientType>,
}

#[derive(Debug)]
pub struct ClientsProjection {
    inner: AggregateStateProjection<Client, ClientView>,
}

impl Default for ClientsProjection {
    fn default() -> Self {
        Self {
            inner: AggregateStateProjection::new(
                Client::AGGREGATE_TYPE,
                |id| Client::empty(ClientId::from(id)),
                ClientView::from_client,
            ),
        }
    }
}

impl ClientsProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tenant_id: TenantId, client_id: ClientId) -> Option<ClientView> {
        self.inner.get(tenant_id, client_id.aggregate_id()).map(|e| e.view)
    }

    /// Clients sorted by display name.
    pub fn list(&self, tenant_id: TenantId, filter: ClientFilter) -> Vec<ClientView> {
        let mut clients: Vec<ClientView> = self
            .inner
            .list(tenant_id)
            .into_iter()
            .map(|e| e.view)
            .filter(|c| filter.active.is_none_or(|a| c.active == a))
            .filter(|c| filter.client_type.is_none_or(|t| c.client_type == t))
            .collect();
        clients.sort_by_cached_key(|c| c.display_name.to_lowercase());
        clients
    }

    /// Emails are unique per tenant, compared case-insensitively.
    pub fn find_by_email(&self, tenant_id: TenantId, email: &str) -> Option<ClientView> {
        let email = email.trim();
        self.inner
            .list(tenant_id)
            .into_iter()
            .map(|e| e.view)
            .find(|c| c.contact.email.as_deref().is_some_and(|e| e.trim().eq_ignore_ascii_case(email)))
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<Applied, ProjectionError> {
        self.inner.apply_envelope(envelope)
    }

    pub fn reset(&self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gescom_clients::{
        ClientDeactivated, ClientDetails, ClientEvent, ClientRegistered,
    };
    use gescom_events::{EnvelopeMeta, Event};
    use uuid::Uuid;

    fn envelope(tenant_id: TenantId, sequence_number: u64, event: &ClientEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            EnvelopeMeta {
                event_id: Uuid::now_v7(),
                tenant_id,
                aggregate_id: event.client_id().aggregate_id(),
                aggregate_type: Client::AGGREGATE_TYPE.to_string(),
                sequence_number,
                event_type: event.event_type().to_string(),
                occurred_at: event.occurred_at(),
            },
            serde_json::to_value(event).unwrap(),
        )
    }

    fn registered(tenant_id: TenantId, details: ClientDetails) -> ClientEvent {
        ClientEvent::ClientRegistered(ClientRegistered {
            tenant_id,
            client_id: ClientId::new(),
            details,
            actor: None,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn lists_filter_and_email_lookup() {
        let tenant_id = TenantId::new();
        let projection = ClientsProjection::new();

        let mut person = ClientDetails::individual("Yassine", "Alaoui");
        person.contact.email = Some("Y.Alaoui@example.ma".to_string());
        let person = registered(tenant_id, person);
        let company = registered(tenant_id, ClientDetails::company("Atlas SARL"));
        projection.apply_envelope(&envelope(tenant_id, 1, &person)).unwrap();
        projection.apply_envelope(&envelope(tenant_id, 1, &company)).unwrap();

        let deactivated = ClientEvent::ClientDeactivated(ClientDeactivated {
            tenant_id,
            client_id: company.client_id(),
            actor: None,
            occurred_at: Utc::now(),
        });
        projection.apply_envelope(&envelope(tenant_id, 2, &deactivated)).unwrap();

        let all = projection.list(tenant_id, ClientFilter::default());
        assert_eq!(
            all.iter().map(|c| c.display_name.as_str()).collect::<Vec<_>>(),
            ["Atlas SARL", "Yassine Alaoui"]
        );

        let active = projection.list(tenant_id, ClientFilter { active: Some(true), client_type: None });
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].client_id, person.client_id());

        let companies = projection.list(
            tenant_id,
            ClientFilter { active: None, client_type: Some(ClientType::Company) },
        );
        assert_eq!(companies.len(), 1);
        assert!(!companies[0].active);

        let found = projection.find_by_email(tenant_id, " y.alaoui@EXAMPLE.ma ").unwrap();
        assert_eq!(found.client_id, person.client_id());
        assert!(projection.find_by_email(TenantId::new(), "y.alaoui@example.ma").is_none());
    }
}
