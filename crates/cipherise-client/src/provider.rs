//! Service provider API.
//!
//! [`ServiceProvider`] owns the registered identity, the session and the
//! collaborators a flow run needs. Administrative calls are plain request /
//! reply exchanges; enrolment and authentication build a Sans-IO flow and
//! hand it to [`driver::run`].

use std::{path::PathBuf, sync::Arc};

use cipherise_core::{
    AuthenticationFlow, AuthenticationReport, AuthenticationRequest, CipheriseError,
    EnrolmentFlow, EnrolmentReport, EnrolmentRequest, EnvRng, Environment, FlowContext,
    HttpRequest, Result, ServerUrl, ServiceIdentity, binding::verify_device, decode_reply,
    decode_reply_with_status,
};
use cipherise_crypto::{Binding, KeyPair};
use cipherise_proto::{
    CreateServiceReply, CreateServiceRequest, DevicesReply, EmptyReply, InfoReply,
    RevokeUserReply, RevokeUserRequest, paths,
};
use tracing::{Instrument, info, info_span, warn};

use crate::{
    driver,
    interaction::Interaction,
    key_store::{FileKeyStore, KeyStore},
    session::{SessionContext, handshake},
    transport::Transport,
};

/// Directory for key files when none is configured.
pub const DEFAULT_KEY_DIR: &str = ".cipherise";

/// Where to find the server and the stored identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Server base URL
    pub server: String,
    /// Service id of an existing registration
    pub service_id: Option<String>,
    /// Directory holding `<serviceId>.key` files
    pub key_dir: PathBuf,
}

impl ProviderConfig {
    /// Config for `server` with no registration and the default key directory.
    pub fn new(server: impl Into<String>) -> Self {
        Self { server: server.into(), service_id: None, key_dir: PathBuf::from(DEFAULT_KEY_DIR) }
    }
}

/// Device bound to a user whose signature chain verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Device id
    pub device_id: String,
    /// Name chosen by the user
    pub friendly_name: String,
    /// Binding is authorised on the server
    pub binding_authorised: bool,
    /// Device is authorised on the server
    pub device_authorised: bool,
}

impl DeviceRecord {
    /// True if both the binding and the device are authorised.
    pub fn is_authorised(&self) -> bool {
        self.binding_authorised && self.device_authorised
    }
}

/// A service provider talking to one Cipherise server.
#[derive(Debug)]
pub struct ServiceProvider<T, K, E> {
    session: SessionContext,
    identity: Option<Arc<ServiceIdentity>>,
    transport: T,
    keys: K,
    env: E,
}

impl<T: Transport, E: Environment> ServiceProvider<T, FileKeyStore, E> {
    /// Provider from a [`ProviderConfig`], loading the identity if one is
    /// configured.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a bad server URL
    /// - `NotRegistered` if a service id is configured but has no key file
    /// - `KeyStore` if the key file cannot be read
    pub fn from_config(config: ProviderConfig, transport: T, env: E) -> Result<Self> {
        let server = ServerUrl::parse(&config.server)?;
        let keys = FileKeyStore::new(config.key_dir);
        match config.service_id {
            Some(service_id) => Self::open(server, &service_id, transport, keys, env),
            None => Ok(Self::new(server, transport, keys, env)),
        }
    }
}

impl<T: Transport, K: KeyStore, E: Environment> ServiceProvider<T, K, E> {
    /// Unregistered provider.
    pub fn new(server: ServerUrl, transport: T, keys: K, env: E) -> Self {
        Self { session: SessionContext::new(server), identity: None, transport, keys, env }
    }

    /// Provider for an existing registration stored in `keys`.
    ///
    /// # Errors
    ///
    /// - `NotRegistered` if `keys` holds nothing for `service_id`
    pub fn open(
        server: ServerUrl,
        service_id: &str,
        transport: T,
        keys: K,
        env: E,
    ) -> Result<Self> {
        let pair = keys.load(service_id)?.ok_or(CipheriseError::NotRegistered)?;
        let mut provider = Self::new(server, transport, keys, env);
        provider.identity = Some(Arc::new(ServiceIdentity::new(service_id, pair)));
        Ok(provider)
    }

    /// Server base URL.
    pub fn server(&self) -> &ServerUrl {
        self.session.server()
    }

    /// Registered service id.
    pub fn service_id(&self) -> Option<&str> {
        self.identity.as_deref().map(ServiceIdentity::service_id)
    }

    /// Session state.
    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    fn identity(&self) -> Result<&Arc<ServiceIdentity>> {
        self.identity.as_ref().ok_or(CipheriseError::NotRegistered)
    }

    async fn session_id(&self) -> Result<&str> {
        let identity = self.identity()?;
        self.session.session_id(&self.transport, identity).await
    }

    /// Server version string. No session is needed.
    pub async fn info(&self) -> Result<String> {
        let request = HttpRequest::get(self.server().endpoint(paths::INFO)?);
        let response = self.transport.request(request).await?;
        let reply: InfoReply = decode_reply(&response)?;
        Ok(reply.server_version)
    }

    /// True if the server accepts a fresh handshake for this identity.
    ///
    /// The handshake result is not cached.
    ///
    /// # Errors
    ///
    /// Transport and schema failures. A server rejection is `Ok(false)`.
    pub async fn is_registered(&self) -> Result<bool> {
        let Some(identity) = &self.identity else {
            return Ok(false);
        };
        match handshake(self.server(), &self.transport, identity).await {
            Ok(_) => Ok(true),
            Err(CipheriseError::Protocol { code, message, .. }) => {
                warn!(code, %message, "service not recognised by server");
                Ok(false)
            },
            Err(err) => Err(err),
        }
    }

    /// Register a new service provider and persist its keys.
    ///
    /// Returns the server-assigned service id.
    ///
    /// # Errors
    ///
    /// - `AlreadyRegistered` if an identity is loaded
    /// - `InvalidInput` for an empty `friendly_name`
    /// - `Transport` unless the server replies `201 Created`
    pub async fn register(&mut self, friendly_name: &str) -> Result<String> {
        if self.identity.is_some() {
            return Err(CipheriseError::AlreadyRegistered);
        }
        if friendly_name.trim().is_empty() {
            return Err(CipheriseError::InvalidInput { reason: "empty friendly name".to_string() });
        }

        let pair = KeyPair::generate(&mut EnvRng(&self.env))?;
        let body = CreateServiceRequest {
            friendly_name: friendly_name.to_string(),
            public_key: pair.public().to_pem()?,
        };
        let request = HttpRequest::post(
            self.server().endpoint(paths::CREATE_SERVICE)?,
            "create service",
            &body,
        )?;
        let response = self.transport.request(request).await?;
        let reply: CreateServiceReply = decode_reply_with_status(&response, 201)?;

        self.keys.save(&reply.service_id, &pair)?;
        self.session.clear();
        self.identity = Some(Arc::new(ServiceIdentity::new(reply.service_id.clone(), pair)));

        info!(service_id = %reply.service_id, "service registered");
        Ok(reply.service_id)
    }

    /// Revoke this service provider.
    ///
    /// The key file is deleted whatever the server says. The identity and
    /// session are only forgotten once the server confirms.
    pub async fn revoke(&mut self) -> Result<()> {
        let service_id = self.identity()?.service_id().to_string();

        let outcome = async {
            let session_id = self.session_id().await?;
            let request = HttpRequest::post_empty(self.server().endpoint(paths::REVOKE_SERVICE)?)
                .with_session(Some(session_id));
            let response = self.transport.request(request).await?;
            decode_reply::<EmptyReply>(&response).map(drop)
        }
        .await;

        let deleted = self.keys.delete(&service_id);
        if outcome.is_ok() {
            self.identity = None;
            self.session.clear();
            info!(%service_id, "service revoked");
        }

        outcome?;
        deleted?;
        Ok(())
    }

    /// Reuse a session id obtained earlier instead of running the handshake.
    pub fn resume_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.identity()?;
        self.session.resume(session_id)
    }

    async fn flow_context(&self) -> Result<FlowContext> {
        let identity = Arc::clone(self.identity()?);
        let session_id = self.session_id().await?.to_string();
        Ok(FlowContext { server: self.server().clone(), identity, session_id })
    }

    /// Enrol a user's device.
    pub async fn enrol<I: Interaction>(
        &self,
        request: EnrolmentRequest,
        interaction: &mut I,
    ) -> Result<EnrolmentReport> {
        let span = info_span!("enrol", username = %request.username);
        async {
            let ctx = self.flow_context().await?;
            let mut flow = EnrolmentFlow::new(ctx, self.env.clone(), request);
            let report = driver::run(&mut flow, &self.transport, interaction, &self.env).await?;
            info!(
                confirmed = report.confirmed,
                device_id = %report.device_id,
                "enrolment finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Authenticate a user by push or wave.
    pub async fn authenticate<I: Interaction>(
        &self,
        request: AuthenticationRequest,
        interaction: &mut I,
    ) -> Result<AuthenticationReport> {
        let span = info_span!("authenticate", level = request.level.value());
        async {
            let mut flow =
                AuthenticationFlow::new(self.flow_context().await?, self.env.clone(), request);
            let report = driver::run(&mut flow, &self.transport, interaction, &self.env).await?;
            info!(
                response = ?report.response,
                verified = report.verified,
                username = %report.username,
                "authentication finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Devices bound to `username` whose signature chains verify.
    ///
    /// With `all`, devices the server considers unauthorised are listed too.
    /// Entries that are malformed or fail verification are skipped.
    pub async fn user_devices(&self, username: &str, all: bool) -> Result<Vec<DeviceRecord>> {
        if username.is_empty() {
            return Err(CipheriseError::InvalidInput { reason: "empty username".to_string() });
        }
        let identity = Arc::clone(self.identity()?);
        let session_id = self.session_id().await?;

        let url =
            self.server().endpoint_for(paths::USER_DEVICES, username, all.then_some("all=true"))?;
        let response =
            self.transport.request(HttpRequest::get(url).with_session(Some(session_id))).await?;
        let reply: DevicesReply = decode_reply(&response)?;

        let mut devices = Vec::with_capacity(reply.devices.len());
        for entry in reply.devices {
            if let Err(err) = entry.validate() {
                warn!(device_id = %entry.device_id, error = %err, "skipping malformed device");
                continue;
            }
            let binding = Binding::new(
                self.server().as_str(),
                identity.service_id(),
                username,
                &entry.device_id,
            );
            let public = identity.keys().public();
            if !verify_device(public, &binding, &entry.public_keys, &entry.signatures) {
                warn!(device_id = %entry.device_id, "skipping device with invalid signatures");
                continue;
            }
            devices.push(DeviceRecord {
                device_id: entry.device_id,
                friendly_name: entry.friendly_name,
                binding_authorised: entry.binding_authorised != 0,
                device_authorised: entry.device_authorised != 0,
            });
        }
        Ok(devices)
    }

    /// Revoke a user, or only the listed devices.
    ///
    /// Returns the requested device ids the server did not recognise.
    pub async fn revoke_user(
        &self,
        username: &str,
        device_ids: Option<Vec<String>>,
    ) -> Result<Vec<String>> {
        if username.is_empty() {
            return Err(CipheriseError::InvalidInput { reason: "empty username".to_string() });
        }
        let session_id = self.session_id().await?;

        let body = RevokeUserRequest { username: username.to_string(), device_ids };
        let url = self.server().endpoint(paths::REVOKE_USER)?;
        let request =
            HttpRequest::post(url, "revoke user", &body)?.with_session(Some(session_id));
        let response = self.transport.request(request).await?;
        let reply: RevokeUserReply = decode_reply(&response)?;

        if !reply.invalid_device_ids.is_empty() {
            warn!(%username, invalid = ?reply.invalid_device_ids, "unknown devices in revocation");
        }
        Ok(reply.invalid_device_ids)
    }
}
