//! # grove Hello Example
//!
//! A small service showing how the pieces of an app tree fit together:
//!
//! - **Groups**: an `/api` child app with its own middleware and error handlers
//! - **Middleware**: a timing header on the API and a token check on `/admin`
//! - **Routes**: derived route names and `url_for` reversal
//! - **Sessions**: a visit counter kept in the default in-memory store
//!
//! ## Running
//!
//! ```bash
//! GROVE_ENV=development cargo run --package hello-demo
//! ```

use grove::axum::http::{HeaderValue, StatusCode};
use grove::prelude::*;
use grove::serde_json::json;

#[tokio::main]
async fn main() -> GroveResult<()> {
    let app = App::new(Options::new().with_name("hello").with_addr("127.0.0.1:8000"));
    let options = app.options();
    grove::core::logging::setup_logging(options.log_level(), options.env());

    app.get("/", |ctx: Context| async move {
        let visits = ctx
            .session()
            .get("visits")
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
            + 1;
        ctx.session().set("visits", visits);
        Ok(HttpResponse::ok(format!("hello, visit number {visits}")))
    })?;

    app.get("/hello/<str:name>", |ctx: Context| async move {
        let name = ctx.param("name").unwrap_or("stranger");
        Ok(HttpResponse::ok(format!("hello, {name}!")))
    })?;

    app.get("/go-home", |ctx: Context| async move {
        let target = ctx.url_for("rootPath", &[])?;
        Ok(HttpResponse::redirect(&target))
    })?;

    mount_api(&app)?;
    mount_admin(&app)?;

    for route in app.all_routes() {
        grove::tracing::debug!(method = %route.method, path = %route.path, name = %route.name, "route");
    }

    app.serve().await
}

fn mount_api(app: &App) -> GroveResult<()> {
    let api = app.group("/api")?;
    api.use_named(
        "timing",
        from_fn(|ctx, next| async move {
            let start = std::time::Instant::now();
            let mut response = next(ctx).await?;
            let elapsed = format!("{:.3}ms", start.elapsed().as_secs_f64() * 1000.0);
            if let Ok(value) = HeaderValue::from_str(&elapsed) {
                response.headers_mut().insert("x-elapsed", value);
            }
            Ok(response)
        }),
    )?;
    api.set_default_error_handler(|status, err, _ctx| {
        HttpResponse::json(status, &json!({ "error": err.to_string(), "status": status.as_u16() }))
    })?;

    api.get("/users/<int:id>", |ctx: Context| async move {
        let id = ctx.param("id").unwrap_or_default().to_string();
        if id == "0" {
            return Err(GroveError::NotFound(format!("no user {id}")));
        }
        let url = ctx.url_for("apiUserPath", &[("id", &id)])?;
        Ok(HttpResponse::json(StatusCode::OK, &json!({ "id": id, "url": url })))
    })?;
    Ok(())
}

fn mount_admin(app: &App) -> GroveResult<()> {
    let admin = app.group("/admin")?;
    admin.use_fn(|ctx, next| async move {
        match ctx.request().header("x-admin-token") {
            Some("letmein") => next(ctx).await,
            _ => Err(GroveError::Unauthorized("admin token required".into())),
        }
    })?;
    admin.set_error_handler(401, |status, _err, _ctx| {
        HttpResponse::plain(status, "go away")
    })?;
    admin.get("/", |_ctx: Context| async { Ok(HttpResponse::ok("welcome, admin")) })?;
    Ok(())
}
