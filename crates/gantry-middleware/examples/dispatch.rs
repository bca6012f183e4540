use std::sync::Arc;

use gantry_core::{
    init_logging, AppConfigTrait, Container, CoreError, Environment, LoggingConfig,
    MiddlewareConfig,
};
use gantry_middleware::{
    Category, DefaultExceptionHandler, ExceptionHandlerConfig, IocMiddleware, Middleware,
    MiddlewareError, MiddlewareFuture, MiddlewareManager, MiddlewareRegistryBuilder, Next, Params,
    Request, Response,
};

/// API tokens accepted by the demo
struct TokenStore(Vec<String>);

struct Authenticate {
    tokens: Arc<TokenStore>,
}

impl Middleware for Authenticate {
    fn handle<'a>(&'a self, request: Request, next: Next, params: Params) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let role = params.str(0).unwrap_or("user");
            let authorized = request
                .header("authorization")
                .map_or(false, |token| self.tokens.0.iter().any(|t| t == token));

            if !authorized {
                return Ok(Response::unauthorized().text(format!("{} token required", role)));
            }
            tracing::info!(role, "request authenticated");
            next.run(request).await
        })
    }

    fn end<'a>(&'a self, response: &'a Response) -> gantry_middleware::EndFuture<'a> {
        Box::pin(async move {
            tracing::info!(status = response.status_code(), "authentication finished");
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "Authenticate"
    }
}

impl IocMiddleware for Authenticate {
    fn from_container(container: &Container) -> Result<Self, CoreError> {
        Ok(Self {
            tokens: container.resolve::<TokenStore>()?,
        })
    }
}

struct Timing;

impl Middleware for Timing {
    fn handle<'a>(&'a self, request: Request, next: Next, _params: Params) -> MiddlewareFuture<'a> {
        Box::pin(async move {
            let started = std::time::Instant::now();
            let response = next.run(request).await?;
            Ok(response.header("x-elapsed-us", started.elapsed().as_micros().to_string()))
        })
    }

    fn name(&self) -> &str {
        "timing"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let environment = Environment::from_env()?;
    init_logging(LoggingConfig::for_environment(environment))?;

    // GANTRY_MIDDLEWARE_CONFIG may point at a YAML or JSON file; fall back to
    // an inline table
    let mut config = MiddlewareConfig::from_env()?;
    if config.alias.is_empty() {
        config = MiddlewareConfig::from_yaml_str(
            r#"
alias:
  auth: app::Authenticate
  api:
    - timing
    - [auth, [admin]]
priority:
  - timing
"#,
        )?;
        config.validate()?;
    }

    let mut container = Container::new();
    container.bind_instance(TokenStore(vec!["secret".to_string()]));

    let registry = MiddlewareRegistryBuilder::new()
        .container(Arc::new(container))
        .register::<Authenticate>("app::Authenticate")
        .register_fn("timing", |_: &Container| Ok(Arc::new(Timing) as Arc<dyn Middleware>))
        .build();

    let handler = DefaultExceptionHandler::with_config(ExceptionHandlerConfig::for_environment(
        environment,
    ));
    let mut manager = MiddlewareManager::new(config, Arc::new(registry))
        .with_exception_handler(Arc::new(handler));
    manager.route("api")?;

    for request in [
        Request::get("/reports"),
        Request::get("/reports").with_header("Authorization", "secret"),
        Request::get("/crash").with_header("Authorization", "secret"),
    ] {
        let response = manager
            .pipeline(Category::ROUTE)
            .run(request, |request: Request| async move {
                if request.path() == "/crash" {
                    return Err(MiddlewareError::with_status(503, "report store unavailable"));
                }
                Ok(Response::ok().text("quarterly report"))
            })
            .await?;

        println!("{} {}", response.status_code(), response.body_text());
        manager.end(&response).await;
    }

    Ok(())
}
