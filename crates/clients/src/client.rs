use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gescom_core::{Aggregate, AggregateRoot, ClientId, DomainError, TenantId, UserId};
use gescom_events::Event;

/// Private person or company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClientType {
    #[default]
    #[serde(rename = "PARTICULIER")]
    Individual,
    #[serde(rename = "ENTREPRISE")]
    Company,
}

impl core::str::FromStr for ClientType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PARTICULIER" => Ok(Self::Individual),
            "ENTREPRISE" => Ok(Self::Company),
            other => Err(DomainError::invalid_input(format!("unknown client type '{other}'"))),
        }
    }
}

/// How to reach a client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Everything about a client except its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetails {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub company: Option<String>,
    pub client_type: ClientType,
    pub contact: ContactInfo,
}

impl ClientDetails {
    pub fn individual(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            company: None,
            client_type: ClientType::Individual,
            contact: ContactInfo::default(),
        }
    }

    pub fn company(name: impl Into<String>) -> Self {
        Self {
            first_name: None,
            last_name: None,
            company: Some(name.into()),
            client_type: ClientType::Company,
            contact: ContactInfo::default(),
        }
    }

    /// Company name for companies, "first last" for individuals.
    pub fn display_name(&self) -> String {
        match self.client_type {
            ClientType::Company => self.company.clone().unwrap_or_default(),
            ClientType::Individual => [self.first_name.as_deref(), self.last_name.as_deref()]
                .into_iter()
                .flatten()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Lowercased, trimmed email used for uniqueness checks.
    pub fn normalized_email(&self) -> Option<String> {
        self.contact
            .email
            .as_deref()
            .map(|e| e.trim().to_ascii_lowercase())
            .filter(|e| !e.is_empty())
    }

    fn validate(&self) -> Result<(), DomainError> {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        match self.client_type {
            ClientType::Individual if !filled(&self.last_name) => {
                return Err(DomainError::invalid_input("last name cannot be empty"));
            }
            ClientType::Company if !filled(&self.company) => {
                return Err(DomainError::invalid_input("company name cannot be empty"));
            }
            _ => {}
        }
        if let Some(email) = self.normalized_email() {
            let valid = email
                .split_once('@')
                .is_some_and(|(user, domain)| !user.is_empty() && domain.contains('.'))
                && !email.contains(char::is_whitespace);
            if !valid {
                return Err(DomainError::invalid_input(format!("invalid email '{email}'")));
            }
        }
        Ok(())
    }
}

/// Aggregate root: Client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Client {
    id: ClientId,
    tenant_id: Option<TenantId>,
    details: ClientDetails,
    active: bool,
    registered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Client {
    pub const AGGREGATE_TYPE: &'static str = "clients.client";

    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ClientId) -> Self {
        Self {
            id,
            tenant_id: None,
            details: ClientDetails::individual("", ""),
            active: false,
            registered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn details(&self) -> &ClientDetails {
        &self.details
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Only registered, active clients can be put on a new order.
    pub fn can_order(&self) -> bool {
        self.created && self.active
    }
}

impl AggregateRoot for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterClient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterClient {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateClientDetails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateClientDetails {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetClientActive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetClientActive {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub active: bool,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientCommand {
    RegisterClient(RegisterClient),
    UpdateClientDetails(UpdateClientDetails),
    SetClientActive(SetClientActive),
}

/// Event: ClientRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistered {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientDetailsUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDetailsUpdated {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub details: ClientDetails,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientActivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientActivated {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ClientDeactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDeactivated {
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientEvent {
    ClientRegistered(ClientRegistered),
    ClientDetailsUpdated(ClientDetailsUpdated),
    ClientActivated(ClientActivated),
    ClientDeactivated(ClientDeactivated),
}

impl ClientEvent {
    pub fn tenant_id(&self) -> TenantId {
        match self {
            ClientEvent::ClientRegistered(e) => e.tenant_id,
            ClientEvent::ClientDetailsUpdated(e) => e.tenant_id,
            ClientEvent::ClientActivated(e) => e.tenant_id,
            ClientEvent::ClientDeactivated(e) => e.tenant_id,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            ClientEvent::ClientRegistered(e) => e.client_id,
            ClientEvent::ClientDetailsUpdated(e) => e.client_id,
            ClientEvent::ClientActivated(e) => e.client_id,
            ClientEvent::ClientDeactivated(e) => e.client_id,
        }
    }
}

impl Event for ClientEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::ClientRegistered(_) => "clients.client.registered",
            ClientEvent::ClientDetailsUpdated(_) => "clients.client.details_updated",
            ClientEvent::ClientActivated(_) => "clients.client.activated",
            ClientEvent::ClientDeactivated(_) => "clients.client.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ClientEvent::ClientRegistered(e) => e.occurred_at,
            ClientEvent::ClientDetailsUpdated(e) => e.occurred_at,
            ClientEvent::ClientActivated(e) => e.occurred_at,
            ClientEvent::ClientDeactivated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Client {
    type Command = ClientCommand;
    type Event = ClientEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ClientEvent::ClientRegistered(e) => {
                self.id = e.client_id;
                self.tenant_id = Some(e.tenant_id);
                self.details = e.details.clone();
                self.active = true;
                self.registered_at = Some(e.occurred_at);
                self.created = true;
            }
            ClientEvent::ClientDetailsUpdated(e) => {
                self.details = e.details.clone();
            }
            ClientEvent::ClientActivated(_) => {
                self.active = true;
            }
            ClientEvent::ClientDeactivated(_) => {
                self.active = false;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ClientCommand::RegisterClient(cmd) => self.handle_register(cmd),
            ClientCommand::UpdateClientDetails(cmd) => self.handle_update(cmd),
            ClientCommand::SetClientActive(cmd) => self.handle_set_active(cmd),
        }
    }
}

impl Client {
    fn ensure_exists(&self, tenant_id: TenantId, client_id: ClientId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.tenant_id != Some(tenant_id) {
            return Err(DomainError::invariant("tenant mismatch"));
        }
        if self.id != client_id {
            return Err(DomainError::invariant("client_id mismatch"));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterClient) -> Result<Vec<ClientEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("client already exists"));
        }
        cmd.details.validate()?;

        // Email uniqueness per tenant is checked against the clients read
        // model before the command is dispatched.
        Ok(vec![ClientEvent::ClientRegistered(ClientRegistered {
            tenant_id: cmd.tenant_id,
            client_id: cmd.client_id,
            details: cmd.details.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateClientDetails) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.client_id)?;
        cmd.details.validate()?;

        if cmd.details == self.details {
            return Ok(vec![]);
        }

        Ok(vec![ClientEvent::ClientDetailsUpdated(ClientDetailsUpdated {
            tenant_id: cmd.tenant_id,
            client_id: cmd.client_id,
            details: cmd.details.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetClientActive) -> Result<Vec<ClientEvent>, DomainError> {
        self.ensure_exists(cmd.tenant_id, cmd.client_id)?;

        if cmd.active == self.active {
            return Ok(vec![]);
        }

        let event = if cmd.active {
            ClientEvent::ClientActivated(ClientActivated {
                tenant_id: cmd.tenant_id,
                client_id: cmd.client_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })
        } else {
            ClientEvent::ClientDeactivated(ClientDeactivated {
                tenant_id: cmd.tenant_id,
                client_id: cmd.client_id,
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            })
        };
        Ok(vec![event])
    }
}
