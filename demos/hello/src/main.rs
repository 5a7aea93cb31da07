//! Hello Example
//!
//! A small in-memory user directory served with Sluice.
//!
//! # Routes
//!
//! ```text
//! GET  /hello/{name}   plain text greeting
//! GET  /users/{id}     JSON user record, 404 when unknown
//! POST /users          creates a user from the `name` form field
//! GET  /me             the user named by the `x-user-id` header
//! ```
//!
//! # Usage
//!
//! ```bash
//! cargo run --package hello
//! curl -d name=grace http://127.0.0.1:8080/users
//! curl -H 'x-user-id: 1' http://127.0.0.1:8080/me
//! ```

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use sluice::prelude::*;
use tracing::info;

type Directory = Arc<RwLock<BTreeMap<u64, String>>>;

// ============================================================================
// Adapters
// ============================================================================

#[derive(Debug, Default, Serialize)]
struct UserView {
    id: u64,
    name: String,
}

impl_structured_adapter!(UserView);

// ============================================================================
// Handlers
// ============================================================================

struct Hello;

impl Handler for Hello {
    type Adapter = TextAdapter;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut TextAdapter) -> HandlerResult {
        let name = ctx.request().params().get("name").unwrap_or("world");
        adapter.set_body(format!("Hello, {name}!"));
        Ok(Outcome::ok())
    }
}

struct GetUser {
    users: Directory,
}

impl Handler for GetUser {
    type Adapter = UserView;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut UserView) -> HandlerResult {
        let Some(id) = ctx.request().params().get_as::<u64>("id") else {
            return Ok(Outcome::replace(
                StatusCode::BAD_REQUEST,
                ErrorAdapter::new("User ids are numeric"),
            ));
        };

        match self.users.read().get(&id) {
            Some(name) => {
                adapter.id = id;
                adapter.name.clone_from(name);
                Ok(Outcome::ok())
            }
            None => Ok(Outcome::replace(
                StatusCode::NOT_FOUND,
                ErrorAdapter::new(format!("No user with id {id}")),
            )),
        }
    }
}

struct CreateUser {
    users: Directory,
}

impl Handler for CreateUser {
    type Adapter = UserView;

    fn handle(&self, ctx: &mut RequestContext, adapter: &mut UserView) -> HandlerResult {
        let name = ctx.request().params().get("name").unwrap_or_default().trim();
        if name.is_empty() {
            return Ok(Outcome::replace(
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorAdapter::new("Names cannot be blank"),
            ));
        }

        let mut users = self.users.write();
        let id = users.last_key_value().map_or(1, |(id, _)| id + 1);
        users.insert(id, name.to_string());

        adapter.id = id;
        adapter.name = name.to_string();
        Ok(Outcome::status(StatusCode::CREATED))
    }
}

/// Resolves the caller from a header and hands over to [`GetUser`].
struct WhoAmI;

impl ChainLink for WhoAmI {
    type Target = GetUser;

    fn handle(
        &self,
        ctx: &mut RequestContext,
        next: &mut InjectableParams,
    ) -> Result<StatusCode, HandlerError> {
        match ctx.request().header("x-user-id") {
            Some(id) => {
                next.put("id", id);
                Ok(StatusCode::OK)
            }
            None => {
                ctx.request_mut().invalidate_with("Missing x-user-id header");
                Ok(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

struct DirectoryApp;

#[async_trait]
impl Application for DirectoryApp {
    async fn on_started(&self, addr: SocketAddr) {
        info!("Try: curl http://{addr}/hello/sluice");
    }

    async fn on_shutdown(&self) {
        info!("Closing the directory");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let users: Directory = Arc::default();
    let mut runtime = SluiceRuntime::new()?;

    let seed = Arc::clone(&users);
    runtime
        .pre_scan(
            0,
            BootFn::new("seed-directory", move || {
                let mut users = seed.write();
                users.insert(1, "ada".to_string());
                users.insert(2, "linus".to_string());
                Ok(())
            }),
        )?
        .route(RouteMeta::get("/hello/{name}").alias("/hello"), Hello)?
        .route(
            RouteMeta::get("/users/{id}").require(["id"]),
            GetUser {
                users: Arc::clone(&users),
            },
        )?
        .route(
            RouteMeta::post("/users").require(["name"]),
            CreateUser {
                users: Arc::clone(&users),
            },
        )?
        .chained(RouteMeta::get("/me"), WhoAmI)?
        .interceptor(Phase::Request, 0, |ctx: &mut RequestContext| {
            ctx.set_data(Instant::now());
        })?
        .interceptor(Phase::Ending, 0, |ctx: &mut RequestContext| {
            let elapsed = ctx.data::<Instant>().map(Instant::elapsed);
            info!(
                method = %ctx.request().method(),
                path = ctx.request().path(),
                status = ?ctx.response().status(),
                ?elapsed,
                "Request finished"
            );
        })?
        .application(DirectoryApp)?;

    runtime.run().await?;
    Ok(())
}
