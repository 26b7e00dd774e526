//! Project-wide files assembled from the aggregated contributions of every
//! file task. Only valid after the join.

use std::collections::BTreeSet;

use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use crate::aggregate::AggregateSnapshot;
use crate::error::MigrationError;
use crate::pending::GeneratedFile;

const AGGREGATE_TEMPLATES: &[(&str, &str, &str)] = &[
    (
        "imports",
        "_Imports.razor",
        include_str!("../templates/aggregate/_Imports.razor.hbs"),
    ),
    (
        "program",
        "Program.cs",
        include_str!("../templates/aggregate/Program.cs.hbs"),
    ),
    (
        "app",
        "App.razor",
        include_str!("../templates/aggregate/App.razor.hbs"),
    ),
    (
        "host",
        "Pages/_Host.cshtml",
        include_str!("../templates/aggregate/_Host.cshtml.hbs"),
    ),
];

const DEFAULT_USINGS: &[&str] = &[
    "System.Net.Http",
    "Microsoft.AspNetCore.Authorization",
    "Microsoft.AspNetCore.Components",
    "Microsoft.AspNetCore.Components.Forms",
    "Microsoft.AspNetCore.Components.Routing",
    "Microsoft.AspNetCore.Components.Web",
    "Microsoft.JSInterop",
];

/// Layout used as the router default when present.
const PREFERRED_LAYOUT: &str = "Site";

#[derive(Serialize)]
struct AggregateContext {
    namespace: String,
    usings: Vec<String>,
    services: Vec<String>,
    pipeline: Vec<String>,
    layout: Option<String>,
}

impl AggregateContext {
    fn new(root_namespace: &str, snapshot: &AggregateSnapshot) -> Self {
        let usings: BTreeSet<String> = DEFAULT_USINGS
            .iter()
            .map(|using| using.to_string())
            .chain(std::iter::once(root_namespace.to_string()))
            .chain(snapshot.imports.iter().cloned())
            .collect();

        let mut services = Vec::new();
        let mut pipeline = Vec::new();
        for (idx, hooks) in snapshot.startup.iter().enumerate() {
            let variable = if snapshot.startup.len() == 1 {
                "startup".to_string()
            } else {
                format!("startup{}", idx + 1)
            };
            services.push(format!("var {variable} = new {}();", hooks.class));
            if hooks.configure_services {
                services.push(format!("{variable}.ConfigureServices(builder.Services);"));
            }
            if hooks.configure {
                pipeline.push(format!("{variable}.Configure(app);"));
            }
        }
        pipeline.extend(
            snapshot
                .middleware
                .iter()
                .map(|class| format!("app.UseMiddleware<{class}>();")),
        );

        let layout = snapshot
            .layouts
            .iter()
            .find(|layout| layout.as_str() == PREFERRED_LAYOUT)
            .or_else(|| snapshot.layouts.first())
            .cloned();

        Self {
            namespace: root_namespace.to_string(),
            usings: usings.into_iter().collect(),
            services,
            pipeline,
            layout,
        }
    }
}

pub struct AggregateAssembler {
    registry: Handlebars<'static>,
}

impl AggregateAssembler {
    pub fn new() -> Result<Self, MigrationError> {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(handlebars::no_escape);
        for (name, _, template) in AGGREGATE_TEMPLATES {
            registry
                .register_template_string(name, *template)
                .map_err(|err| MigrationError::from(err).context(*name))?;
        }
        Ok(Self { registry })
    }

    pub fn assemble(
        &self,
        root_namespace: &str,
        snapshot: &AggregateSnapshot,
    ) -> Result<Vec<GeneratedFile>, MigrationError> {
        let context = AggregateContext::new(root_namespace, snapshot);
        let mut files = Vec::with_capacity(AGGREGATE_TEMPLATES.len());
        for (name, path, _) in AGGREGATE_TEMPLATES {
            let content = self
                .registry
                .render(name, &context)
                .map_err(|err| MigrationError::from(err).context(*path))?;
            debug!(path, "assembled aggregate file");
            files.push(GeneratedFile::text(*path, content));
        }
        Ok(files)
    }
}
