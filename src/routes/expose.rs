//! Route exposure: computes URL templates for entities, relationships and custom methods,
//! registers a resource class for each and records their documentation.
//!
//! Exposure runs once at startup. `Api::into_router` then freezes the route table and the
//! documentation object into an `axum::Router`.

use super::common::common_routes;
use super::url;
use crate::config::{ApiSettings, Entity, MethodBinding, Model, RelationshipDescriptor};
use crate::docs::{axum_path, doc_head, parse_doc, synth, DocRegistry};
use crate::error::{ConfigError, ExposeError};
use crate::handlers::ApiRequest;
use crate::resource::{Resource, ResourceClass, Verb};
use crate::response::LinkTable;
use crate::state::ApiState;
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, RawQuery, State};
use axum::response::Html;
use axum::routing::{get, MethodRouter};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub template: String,
    pub endpoint: String,
    pub verbs: Vec<Verb>,
    pub class: Arc<ResourceClass>,
}

/// Ordered registrations. Endpoint names and (template, verb) pairs are unique.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn add(&mut self, entry: RouteEntry) -> Result<(), ExposeError> {
        if self.entries.iter().any(|e| e.endpoint == entry.endpoint) {
            return Err(ExposeError::DuplicateEndpoint(entry.endpoint));
        }
        for verb in &entry.verbs {
            if self
                .entries
                .iter()
                .any(|e| e.template == entry.template && e.verbs.contains(verb))
            {
                return Err(ExposeError::DuplicateRoute {
                    template: entry.template,
                    verb: verb.as_str(),
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn endpoint(&self, name: &str) -> Option<&RouteEntry> {
        self.entries.iter().find(|e| e.endpoint == name)
    }

    /// Distinct templates in registration order.
    fn templates(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for e in &self.entries {
            if !out.contains(&e.template.as_str()) {
                out.push(&e.template);
            }
        }
        out
    }
}

/// The exposure engine.
pub struct Api {
    settings: ApiSettings,
    store: Arc<dyn crate::store::Store>,
    model: Model,
    registry: DocRegistry,
    links: LinkTable,
    routes: RouteTable,
}

impl Api {
    pub fn new(settings: ApiSettings, store: Arc<dyn crate::store::Store>, model: Model) -> Self {
        let links = LinkTable::new(settings.relationship_url_fmt.clone());
        Api {
            settings,
            store,
            model,
            registry: DocRegistry::new(),
            links,
            routes: RouteTable::default(),
        }
    }

    /// Use a caller-provided documentation object instead of a fresh one.
    pub fn with_registry(mut self, registry: DocRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &DocRegistry {
        &self.registry
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.routes
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Expose every entity of the model.
    pub fn expose_all(&mut self, url_prefix: &str) -> Result<(), ExposeError> {
        let types: Vec<String> = self
            .model
            .entities
            .iter()
            .map(|e| e.type_name.clone())
            .collect();
        for t in types {
            self.expose_object(&t, url_prefix)?;
        }
        Ok(())
    }

    /// Expose one entity: collection and instance URLs, its relationships and its public
    /// methods.
    ///
    /// On error the route table, link table and documentation object are left as they were
    /// before the call.
    pub fn expose_object(&mut self, type_name: &str, url_prefix: &str) -> Result<(), ExposeError> {
        let saved = (self.registry.clone(), self.routes.clone(), self.links.clone());
        let result = self.expose_object_parts(type_name, url_prefix);
        if result.is_err() {
            (self.registry, self.routes, self.links) = saved;
        }
        result
    }

    fn expose_object_parts(&mut self, type_name: &str, url_prefix: &str) -> Result<(), ExposeError> {
        let entity = self
            .model
            .entity(type_name)
            .cloned()
            .ok_or_else(|| ExposeError::UnknownEntity(type_name.to_string()))?;
        let prefix = url::join_prefix(&self.settings.url_prefix, url_prefix);
        let id_param = entity.object_id(&self.settings.object_id_suffix);

        let tag_doc = match parse_doc(&entity.type_name, entity.doc.as_deref())? {
            Some(block) => block.description.or(block.summary),
            None => None,
        }
        .or_else(|| {
            entity
                .doc
                .as_deref()
                .map(doc_head)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        });
        self.registry.add_tag(&entity.type_name, tag_doc);

        self.expose_entity(&entity, &prefix, url_prefix, &id_param)?;
        for r in &entity.relationships {
            let rel = self
                .model
                .relationship(&entity.type_name, &r.name)
                .ok_or_else(|| ConfigError::MissingReference {
                    kind: "entity type",
                    id: r.target.clone(),
                })?;
            self.expose_relationship(&rel, &prefix, url_prefix, &id_param)?;
        }
        for method in entity.public_methods() {
            self.expose_method(&entity, &method.name, &prefix, url_prefix, &id_param)?;
        }
        Ok(())
    }

    fn expose_entity(
        &mut self,
        entity: &Arc<Entity>,
        prefix: &str,
        extra_prefix: &str,
        id_param: &str,
    ) -> Result<(), ExposeError> {
        let collection = url::collection(&self.settings, prefix, &entity.type_name);
        let instance = url::instance(&self.settings, prefix, &entity.type_name, id_param);
        let endpoint = url::endpoint(extra_prefix, &entity.type_name);
        let class = ResourceClass::new(
            &entity.type_name,
            Resource::Entity {
                entity: entity.clone(),
                id_param: id_param.to_string(),
            },
        );

        for verb in [Verb::Get, Verb::Post] {
            let mut op = synth::entity_operation(&mut self.registry, entity, id_param, verb)?;
            if verb == Verb::Get {
                op.parameters.extend(synth::collection_params(entity));
            }
            self.registry.register(&collection, verb, op)?;
        }
        self.routes.add(RouteEntry {
            template: collection.clone(),
            endpoint: endpoint.clone(),
            verbs: vec![Verb::Get, Verb::Post],
            class: class.clone(),
        })?;
        info!(entity = %entity.type_name, url = %collection, endpoint = %endpoint, "exposed collection");

        for verb in [Verb::Get, Verb::Patch, Verb::Delete] {
            let op = synth::entity_operation(&mut self.registry, entity, id_param, verb)?;
            self.registry.register(&instance, verb, op)?;
        }
        let instance_endpoint = format!("{}Id", endpoint);
        self.routes.add(RouteEntry {
            template: instance.clone(),
            endpoint: instance_endpoint.clone(),
            verbs: vec![Verb::Get, Verb::Patch, Verb::Delete],
            class,
        })?;
        info!(entity = %entity.type_name, url = %instance, endpoint = %instance_endpoint, "exposed instance");

        self.links
            .add_entity(&entity.type_name, &collection, &instance, id_param);
        Ok(())
    }

    fn expose_relationship(
        &mut self,
        rel: &RelationshipDescriptor,
        prefix: &str,
        extra_prefix: &str,
        parent_param: &str,
    ) -> Result<(), ExposeError> {
        let mut child_param = rel.child.object_id(&self.settings.object_id_suffix);
        if rel.self_referencing() {
            child_param.push('2');
        }
        let parent_instance = url::instance(&self.settings, prefix, &rel.parent.type_name, parent_param);
        let root = url::relationship(&self.settings, &parent_instance, &rel.name);
        let child = url::relationship_child(&root, &child_param);
        let endpoint = url::endpoint(extra_prefix, &format!("{}.{}", rel.parent.type_name, rel.name));
        let class = ResourceClass::new(
            format!("{}.{}", rel.parent.type_name, rel.name),
            Resource::Relationship {
                rel: rel.clone(),
                parent_param: parent_param.to_string(),
                child_param: child_param.clone(),
            },
        );

        let root_verbs = vec![Verb::Get, Verb::Post, Verb::Patch];
        for verb in &root_verbs {
            let mut op = synth::relationship_operation(
                &mut self.registry,
                rel,
                parent_param,
                &child_param,
                *verb,
            )?;
            if *verb == Verb::Get {
                op.parameters.extend(synth::collection_params(&rel.child));
            }
            self.registry.register(&root, *verb, op)?;
        }
        self.routes.add(RouteEntry {
            template: root.clone(),
            endpoint: endpoint.clone(),
            verbs: root_verbs,
            class: class.clone(),
        })?;
        info!(relationship = %rel.name, parent = %rel.parent.type_name, url = %root, endpoint = %endpoint, "exposed relationship");

        let child_verbs = vec![Verb::Get, Verb::Delete];
        for verb in &child_verbs {
            let op = synth::relationship_operation(
                &mut self.registry,
                rel,
                parent_param,
                &child_param,
                *verb,
            )?;
            self.registry.register(&child, *verb, op)?;
        }
        let child_endpoint = format!("{}Id", endpoint);
        self.routes.add(RouteEntry {
            template: child.clone(),
            endpoint: child_endpoint.clone(),
            verbs: child_verbs,
            class,
        })?;
        info!(relationship = %rel.name, parent = %rel.parent.type_name, url = %child, endpoint = %child_endpoint, "exposed relationship item");
        Ok(())
    }

    fn expose_method(
        &mut self,
        entity: &Arc<Entity>,
        name: &str,
        prefix: &str,
        extra_prefix: &str,
        id_param: &str,
    ) -> Result<(), ExposeError> {
        let Some(method) = entity.method(name) else {
            return Ok(());
        };
        let target = format!("{}.{}", entity.type_name, method.name);
        let doc = parse_doc(&target, method.doc.as_deref())?;
        let verbs = match doc.as_ref().map(|d| d.http_methods.as_slice()) {
            None | Some([]) => vec![Verb::Post],
            Some(methods) => methods
                .iter()
                .map(|m| {
                    Verb::parse(m).ok_or_else(|| {
                        ConfigError::Validation(format!("{}: unsupported http method '{}'", target, m))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        };

        let template = match method.binding {
            MethodBinding::Class => {
                url::class_method(&self.settings, prefix, &entity.table_name, &method.name)
            }
            MethodBinding::Instance => url::instance_method(
                &self.settings,
                prefix,
                &entity.table_name,
                id_param,
                &method.name,
            ),
        };
        for verb in &verbs {
            let op = synth::method_operation(
                &mut self.registry,
                entity,
                method,
                doc.as_ref(),
                id_param,
                *verb,
            )?;
            self.registry.register(&template, *verb, op)?;
        }
        let endpoint = url::endpoint(extra_prefix, &format!("{}.{}", entity.table_name, method.name));
        self.routes.add(RouteEntry {
            template: template.clone(),
            endpoint: endpoint.clone(),
            verbs,
            class: ResourceClass::new(
                target,
                Resource::Method {
                    entity: entity.clone(),
                    method: method.name.clone(),
                    id_param: id_param.to_string(),
                },
            ),
        })?;
        info!(entity = %entity.type_name, method = %method.name, url = %template, endpoint = %endpoint, "exposed method");
        Ok(())
    }

    /// Freeze routes and documentation into a router.
    pub fn into_router(self) -> Result<Router, ExposeError> {
        self.registry.validate()?;
        let openapi = self
            .registry
            .build_openapi(&self.settings.title, &self.settings.version);
        let spec_url = self.settings.api_spec_url.trim_end_matches('/').to_string();
        let max_body = self.settings.max_body_bytes;
        let state = ApiState {
            store: self.store,
            settings: Arc::new(self.settings),
            links: Arc::new(self.links),
        };

        let mut router: Router<ApiState> = Router::new();
        for template in self.routes.templates() {
            let mut method_router: MethodRouter<ApiState> = MethodRouter::new();
            for entry in self.routes.entries.iter().filter(|e| e.template == template) {
                for &verb in &entry.verbs {
                    let class = entry.class.clone();
                    method_router = method_router.on(
                        verb.filter(),
                        move |State(state): State<ApiState>,
                              path: PathParams,
                              RawQuery(query): RawQuery,
                              body: Result<Bytes, BytesRejection>| async move {
                            let req = ApiRequest::from_parts(
                                path.map(|Path(p)| p).unwrap_or_default(),
                                query.as_deref(),
                                body,
                            );
                            class.call(&state, verb, req).await
                        },
                    );
                }
            }
            router = router.route(&axum_path(template), method_router);
        }

        let openapi = Arc::new(openapi);
        let json_url = format!("{}.json", spec_url);
        let page = swagger_page(&json_url);
        router = router
            .route(
                &json_url,
                get(move || {
                    let openapi = openapi.clone();
                    async move { Json(openapi.as_ref().clone()) }
                }),
            )
            .route(
                &format!("{}.html", spec_url),
                get(move || {
                    let page = page.clone();
                    async move { Html(page) }
                }),
            );

        Ok(router
            .merge(common_routes())
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(RequestBodyLimitLayer::new(max_body))
                    .layer(DefaultBodyLimit::disable()),
            )
            .with_state(state))
    }
}

type PathParams = Option<Path<HashMap<String, String>>>;

fn swagger_page(spec_json_url: &str) -> String {
    format!(
        r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>API documentation</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css"/>
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>SwaggerUIBundle({{ url: "{}", dom_id: "#swagger-ui" }});</script>
</body>
</html>
"##,
        spec_json_url
    )
}
