//! Docker volume plugin protocol
//!
//! ## Endpoints
//!
//! POST /Plugin.Activate - Handshake
//! POST /VolumeDriver.Create - Create volume
//! POST /VolumeDriver.Get - Describe volume
//! POST /VolumeDriver.List - List volumes
//! POST /VolumeDriver.Remove - Remove volume
//! POST /VolumeDriver.Path - Resolve mountpoint
//! POST /VolumeDriver.Mount - Resolve mountpoint for a container
//! POST /VolumeDriver.Unmount - Release (no-op)
//! POST /VolumeDriver.Capabilities - Driver scope

use actix_web::error::BlockingError;
use actix_web::web::{self, Bytes};
use actix_web::HttpResponse;
use docker_zfs_plugin::{VolumeDriver, VolumeError, VolumeInfo, VolumeOptions};
use log::{error, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const PLUGIN_CONTENT_TYPE: &str = "application/vnd.docker.plugins.v1.2+json";

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/Plugin.Activate", web::post().to(activate))
        .route("/VolumeDriver.Create", web::post().to(create_volume))
        .route("/VolumeDriver.Get", web::post().to(get_volume))
        .route("/VolumeDriver.List", web::post().to(list_volumes))
        .route("/VolumeDriver.Remove", web::post().to(remove_volume))
        .route("/VolumeDriver.Path", web::post().to(volume_path))
        .route("/VolumeDriver.Mount", web::post().to(mount_volume))
        .route("/VolumeDriver.Unmount", web::post().to(unmount_volume))
        .route("/VolumeDriver.Capabilities", web::post().to(capabilities));
}

// ============ Protocol Types ============

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRequest {
    pub name: String,
    #[serde(default)]
    pub opts: Option<VolumeOptions>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NameRequest {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountRequest {
    pub name: String,
    #[serde(rename = "ID", default)]
    pub id: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VolumeBody {
    pub name: String,
    pub mountpoint: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_at: Option<String>,
}

impl From<VolumeInfo> for VolumeBody {
    fn from(info: VolumeInfo) -> Self {
        Self {
            name: info.name,
            mountpoint: info.mountpoint,
            created_at: info.created_at.map(|ts| ts.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ErrResponse {
    pub err: String,
}

impl ErrResponse {
    fn none() -> Self {
        Self { err: String::new() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetResponse {
    pub volume: VolumeBody,
    pub err: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResponse {
    pub volumes: Vec<VolumeBody>,
    pub err: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MountpointResponse {
    pub mountpoint: String,
    pub err: String,
}

impl MountpointResponse {
    fn new(mountpoint: String) -> Self {
        Self {
            mountpoint,
            err: String::new(),
        }
    }
}

// ============ Helpers ============

fn plugin_ok(body: impl Serialize) -> HttpResponse {
    HttpResponse::Ok()
        .content_type(PLUGIN_CONTENT_TYPE)
        .json(body)
}

fn plugin_err(message: impl Into<String>) -> HttpResponse {
    HttpResponse::InternalServerError()
        .content_type(PLUGIN_CONTENT_TYPE)
        .json(ErrResponse {
            err: message.into(),
        })
}

/// Docker sends its own content type and sometimes no body at all, so
/// requests are decoded from raw bytes
fn parse<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, HttpResponse> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        HttpResponse::BadRequest()
            .content_type(PLUGIN_CONTENT_TYPE)
            .json(ErrResponse {
                err: format!("Invalid request body: {}", e),
            })
    })
}

fn respond<T, B: Serialize>(
    outcome: Result<Result<T, VolumeError>, BlockingError>,
    body: impl FnOnce(T) -> B,
) -> HttpResponse {
    match outcome {
        Ok(Ok(value)) => plugin_ok(body(value)),
        Ok(Err(e)) => {
            if e.is_client_error() {
                warn!("{}", e);
            } else {
                error!("{}", e);
            }
            plugin_err(e.to_string())
        }
        Err(e) => plugin_err(format!("Worker failed: {}", e)),
    }
}

// ============ Handlers ============

async fn activate() -> HttpResponse {
    plugin_ok(serde_json::json!({ "Implements": ["VolumeDriver"] }))
}

async fn create_volume(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: CreateRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome =
        web::block(move || driver.create(&req.name, req.opts.unwrap_or_default())).await;
    respond(outcome, |()| ErrResponse::none())
}

async fn get_volume(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: NameRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome = web::block(move || driver.get(&req.name)).await;
    respond(outcome, |info| GetResponse {
        volume: info.into(),
        err: String::new(),
    })
}

async fn list_volumes(driver: web::Data<VolumeDriver>) -> HttpResponse {
    let outcome = web::block(move || Ok::<_, VolumeError>(driver.list())).await;
    respond(outcome, |volumes: Vec<VolumeInfo>| ListResponse {
        volumes: volumes.into_iter().map(VolumeBody::from).collect(),
        err: String::new(),
    })
}

async fn remove_volume(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: NameRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome = web::block(move || driver.remove(&req.name)).await;
    respond(outcome, |()| ErrResponse::none())
}

async fn volume_path(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: NameRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome = web::block(move || driver.path(&req.name)).await;
    respond(outcome, MountpointResponse::new)
}

async fn mount_volume(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: MountRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    let outcome = web::block(move || driver.mount(&req.name, &req.id)).await;
    respond(outcome, MountpointResponse::new)
}

async fn unmount_volume(body: Bytes, driver: web::Data<VolumeDriver>) -> HttpResponse {
    let req: MountRequest = match parse(&body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };

    respond(Ok(driver.unmount(&req.name, &req.id)), |()| {
        ErrResponse::none()
    })
}

async fn capabilities(driver: web::Data<VolumeDriver>) -> HttpResponse {
    let caps = driver.capabilities();
    plugin_ok(serde_json::json!({
        "Capabilities": { "Scope": caps.scope.to_string() }
    }))
}
