//! Code-behind classification and lifecycle remapping.

pub mod lifecycle;
pub mod render;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::aggregate::{MigrationServices, StartupHooks};
use crate::analysis::{MemberKind, MethodDecl, SourceAnalysis, TypeDecl, TypeKind, simple_name};
use crate::error::MigrationError;
use crate::naming::{area_path, component_name, namespace_for_dir, relative_dir};
use crate::pending::GeneratedFile;

use lifecycle::{
    APPLICATION_LIFECYCLE, LifecyclePlan, MODULE_LIFECYCLE, PAGE_LIFECYCLE, TargetHook,
};
use render::{ClassOutline, handler_sections, method, nested, wrap_in_file};

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClassVariant {
    RootApplication,
    PageBehind,
    ControlBehind,
    LayoutBehind,
    RequestHandler,
    RequestFilter,
    Unknown,
}

/// What classification looks at: nothing else about the type matters.
#[derive(Clone, Copy, Debug)]
pub struct ClassFacts<'a> {
    pub chain: &'a [String],
    pub capabilities: &'a BTreeSet<String>,
    /// Lower-cased file name.
    pub file_name: &'a str,
}

impl ClassFacts<'_> {
    fn inherits(&self, name: &str) -> bool {
        self.chain.iter().any(|base| base == name)
    }

    fn implements(&self, name: &str) -> bool {
        self.capabilities.contains(name)
    }
}

type Predicate = fn(&ClassFacts<'_>) -> bool;

/// Checked top to bottom; the first match wins.
const CLASSIFICATION: &[(Predicate, ClassVariant)] = &[
    (
        |facts| facts.inherits("HttpApplication"),
        ClassVariant::RootApplication,
    ),
    (
        |facts| facts.inherits("Page") && facts.file_name.ends_with(".aspx.cs"),
        ClassVariant::PageBehind,
    ),
    (
        |facts| facts.inherits("UserControl") && facts.file_name.ends_with(".ascx.cs"),
        ClassVariant::ControlBehind,
    ),
    (
        |facts| facts.inherits("MasterPage") && facts.file_name.ends_with(".master.cs"),
        ClassVariant::LayoutBehind,
    ),
    (
        |facts| facts.implements("IHttpHandler") || facts.implements("IHttpAsyncHandler"),
        ClassVariant::RequestHandler,
    ),
    (
        |facts| facts.implements("IHttpModule"),
        ClassVariant::RequestFilter,
    ),
];

pub fn classify(facts: &ClassFacts<'_>) -> ClassVariant {
    CLASSIFICATION
        .iter()
        .find(|(predicate, _)| predicate(facts))
        .map(|(_, variant)| *variant)
        .unwrap_or(ClassVariant::Unknown)
}

/// Legacy interfaces that have no counterpart after conversion.
const LEGACY_CAPABILITIES: &[&str] = &[
    "IHttpHandler",
    "IHttpAsyncHandler",
    "IHttpModule",
    "IRequiresSessionState",
    "IReadOnlySessionState",
];

/// Output location of a converted type. Pure in its inputs.
pub fn output_path(relative: &Path, variant: ClassVariant, type_name: Option<&str>) -> PathBuf {
    let stem = component_name(relative);
    match variant {
        ClassVariant::PageBehind => area_path("Pages", relative, &format!("{stem}.razor.cs")),
        ClassVariant::ControlBehind => {
            area_path("Components", relative, &format!("{stem}.razor.cs"))
        }
        ClassVariant::LayoutBehind => area_path("Shared", relative, &format!("{stem}.razor.cs")),
        ClassVariant::RequestHandler | ClassVariant::RequestFilter => area_path(
            "Middleware",
            relative,
            &format!("{}.cs", type_name.unwrap_or(&stem)),
        ),
        ClassVariant::RootApplication => PathBuf::from("Startup.cs"),
        ClassVariant::Unknown => match type_name {
            Some(name) => relative_dir(relative).join(format!("{name}.cs")),
            None => relative.to_path_buf(),
        },
    }
}

/// Classification outcome for one type, as reported by `scan`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ClassifiedType {
    pub name: String,
    pub variant: ClassVariant,
    pub output: PathBuf,
}

/// Converts every namespace-level type of a code file independently.
pub struct ClassConverter<'a> {
    analysis: &'a dyn SourceAnalysis,
    root_namespace: &'a str,
    services: &'a MigrationServices,
}

impl<'a> ClassConverter<'a> {
    pub fn new(
        analysis: &'a dyn SourceAnalysis,
        root_namespace: &'a str,
        services: &'a MigrationServices,
    ) -> Self {
        Self {
            analysis,
            root_namespace,
            services,
        }
    }

    pub fn classify_type(&self, decl: &TypeDecl, relative: &Path) -> ClassVariant {
        if decl.kind != TypeKind::Class {
            return ClassVariant::Unknown;
        }
        let chain = self.analysis.base_type_chain(decl);
        let capabilities = self.analysis.capabilities(decl);
        let file_name = relative
            .file_name()
            .map(|name| name.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        classify(&ClassFacts {
            chain: &chain,
            capabilities: &capabilities,
            file_name: &file_name,
        })
    }

    /// Classification of every type in `text` without converting anything.
    pub fn scan(&self, relative: &Path, text: &str) -> Result<Vec<ClassifiedType>, MigrationError> {
        let unit = self.analysis.parse(relative, text)?;
        let multi = unit.types.len() > 1;
        Ok(unit
            .types
            .iter()
            .map(|decl| {
                let variant = self.classify_type(decl, relative);
                ClassifiedType {
                    name: decl.name.clone(),
                    variant,
                    output: output_path(relative, variant, multi.then_some(decl.name.as_str())),
                }
            })
            .collect())
    }

    pub fn convert_file(
        &self,
        relative: &Path,
        text: &str,
    ) -> Result<Vec<GeneratedFile>, MigrationError> {
        let unit = self
            .analysis
            .parse(relative, text)
            .map_err(|err| err.context(relative.display()))?;
        if unit.types.is_empty() {
            debug!(path = %relative.display(), "no type declarations, copying verbatim");
            return Ok(vec![GeneratedFile::text(relative, text)]);
        }

        let variants: Vec<ClassVariant> = unit
            .types
            .iter()
            .map(|decl| self.classify_type(decl, relative))
            .collect();
        if variants == [ClassVariant::Unknown] {
            debug!(path = %relative.display(), "unknown type, copying verbatim");
            return Ok(vec![GeneratedFile::text(relative, text)]);
        }

        let multi = unit.types.len() > 1;
        let usings: Vec<String> = unit
            .usings
            .iter()
            .filter(|using| !is_legacy_namespace(&using.namespace))
            .map(|using| using.text.clone())
            .collect();

        let mut files = Vec::with_capacity(unit.types.len());
        for (decl, variant) in unit.types.iter().zip(variants) {
            info!(
                path = %relative.display(),
                class = %decl.name,
                variant = ?variant,
                "converting class"
            );
            let type_name = multi.then_some(decl.name.as_str());
            let path = output_path(relative, variant, type_name);
            let content = match variant {
                ClassVariant::Unknown => wrap_in_file(&usings, decl.namespace.as_deref(), &decl.text),
                ClassVariant::PageBehind | ClassVariant::ControlBehind | ClassVariant::LayoutBehind => {
                    self.convert_view_behind(decl, relative, variant, &usings)
                }
                ClassVariant::RootApplication => self.convert_application(decl, &usings),
                ClassVariant::RequestHandler => self.convert_handler(decl, &usings),
                ClassVariant::RequestFilter => self.convert_filter(decl, &usings),
            };
            files.push(GeneratedFile::text(path, content));
        }
        Ok(files)
    }

    fn outline(&self, decl: &TypeDecl, usings: &[String]) -> ClassOutline {
        let chain = self.analysis.base_type_chain(decl);
        let legacy_base = chain.first().map(String::as_str);
        ClassOutline {
            usings: usings.to_vec(),
            namespace: decl.namespace.clone(),
            attributes: decl.attributes.clone(),
            modifiers: decl.modifiers.clone(),
            keyword: "class".to_string(),
            name: decl.name.clone(),
            bases: decl
                .base_list
                .iter()
                .filter(|base| {
                    let name = simple_name(base);
                    Some(name) != legacy_base && !LEGACY_CAPABILITIES.contains(&name)
                })
                .cloned()
                .collect(),
            members: Vec::new(),
        }
    }

    fn convert_view_behind(
        &self,
        decl: &TypeDecl,
        relative: &Path,
        variant: ClassVariant,
        usings: &[String],
    ) -> String {
        let plan = PAGE_LIFECYCLE.plan(decl);
        let mut outline = self.outline(decl, usings);

        let component = component_name(relative);
        if component != decl.name {
            outline
                .attributes
                .insert(0, format!("// Renamed from {}", decl.name));
            outline.name = component;
        }
        outline.namespace = Some(namespace_for_dir(self.root_namespace, &relative_dir(relative)));
        if !outline.modifiers.iter().any(|modifier| modifier == "partial") {
            outline.modifiers.push("partial".to_string());
        }

        let target_base = if variant == ClassVariant::LayoutBehind {
            "LayoutComponentBase"
        } else {
            "ComponentBase"
        };
        outline.bases.insert(0, target_base.to_string());
        add_using(&mut outline.usings, "Microsoft.AspNetCore.Components");
        if plan.has(TargetHook::SetParametersAsync) {
            add_using(&mut outline.usings, "System.Threading.Tasks");
        }
        if plan.has(TargetHook::Dispose) {
            add_using(&mut outline.usings, "System");
            if !outline.bases.iter().any(|base| simple_name(base) == "IDisposable") {
                outline.bases.push("IDisposable".to_string());
            }
        }

        outline.members = passthrough(decl, &plan);
        if plan.has(TargetHook::SetParametersAsync) {
            let mut lines = handler_sections(plan.handlers(TargetHook::SetParametersAsync));
            lines.push("await base.SetParametersAsync(parameters);".to_string());
            outline.members.push(method(
                "public override async Task SetParametersAsync(ParameterView parameters)",
                &lines,
            ));
        }
        if plan.has(TargetHook::OnInitialized) {
            outline.members.push(method(
                "protected override void OnInitialized()",
                &handler_sections(plan.handlers(TargetHook::OnInitialized)),
            ));
        }
        if plan.has(TargetHook::OnAfterRender) {
            outline.members.push(method(
                "protected override void OnAfterRender(bool firstRender)",
                &handler_sections(plan.handlers(TargetHook::OnAfterRender)),
            ));
        }
        if plan.has(TargetHook::Dispose) {
            outline.members.push(method(
                "public void Dispose()",
                &handler_sections(plan.handlers(TargetHook::Dispose)),
            ));
        }
        outline.render()
    }

    fn convert_application(&self, decl: &TypeDecl, usings: &[String]) -> String {
        let plan = APPLICATION_LIFECYCLE.plan(decl);
        let mut outline = self.outline(decl, usings);
        if decl.name != "Startup" {
            outline
                .attributes
                .insert(0, format!("// Renamed from {}", decl.name));
        }
        outline.name = "Startup".to_string();
        outline.modifiers.retain(|modifier| modifier != "abstract");

        let configure = plan.has(TargetHook::ConfigureBefore) || plan.has(TargetHook::ConfigureAfter);
        let configure_services = plan.has(TargetHook::ConfigureServices);
        if configure_services {
            add_using(&mut outline.usings, "Microsoft.Extensions.DependencyInjection");
        }
        if configure {
            add_using(&mut outline.usings, "Microsoft.AspNetCore.Builder");
        }

        outline.members = passthrough(decl, &plan);
        if configure_services {
            outline.members.push(method(
                "public void ConfigureServices(IServiceCollection services)",
                &handler_sections(plan.handlers(TargetHook::ConfigureServices)),
            ));
        }
        if configure {
            let mut lines = vec!["app.Use(async (context, next) =>".to_string(), "{".to_string()];
            lines.extend(nested(&handler_sections(plan.handlers(TargetHook::ConfigureBefore))));
            lines.push("    await next();".to_string());
            lines.extend(nested(&handler_sections(plan.handlers(TargetHook::ConfigureAfter))));
            lines.push("});".to_string());
            outline
                .members
                .push(method("public void Configure(IApplicationBuilder app)", &lines));
        }

        let class = match &outline.namespace {
            Some(namespace) => format!("{namespace}.Startup"),
            None => "Startup".to_string(),
        };
        self.services.startup.add_startup(StartupHooks {
            class,
            configure_services,
            configure,
        });
        outline.render()
    }

    fn convert_handler(&self, decl: &TypeDecl, usings: &[String]) -> String {
        let mut outline = self.outline(decl, usings);
        add_using(&mut outline.usings, "Microsoft.AspNetCore.Http");
        add_using(&mut outline.usings, "System.Threading.Tasks");
        outline.members = next_delegate_members(&decl.name);

        let mut replaced = false;
        for member in &decl.members {
            match &member.kind {
                MemberKind::Method(process) if !replaced && is_process_request(process) => {
                    replaced = true;
                    outline.members.push(invoke_from_process_request(process));
                }
                _ => outline.members.push(member.text.clone()),
            }
        }
        if !replaced {
            outline.members.push(method(
                "public async Task InvokeAsync(HttpContext context)",
                &["await _next(context);".to_string()],
            ));
        }

        self.services.startup.add_middleware(&decl.qualified_name());
        outline.render()
    }

    fn convert_filter(&self, decl: &TypeDecl, usings: &[String]) -> String {
        let plan = MODULE_LIFECYCLE.plan(decl);
        let mut outline = self.outline(decl, usings);
        add_using(&mut outline.usings, "Microsoft.AspNetCore.Http");
        add_using(&mut outline.usings, "System.Threading.Tasks");

        outline.members = next_delegate_members(&decl.name);
        for (idx, member) in decl.members.iter().enumerate() {
            if plan.is_moved(idx) {
                continue;
            }
            match (&plan.init_rewrite, &member.kind) {
                (Some((init_idx, remaining)), MemberKind::Method(init)) if *init_idx == idx => {
                    if !remaining.is_empty() {
                        outline.members.push(method(&signature_of(init), remaining));
                    }
                }
                _ => outline.members.push(member.text.clone()),
            }
        }

        let mut lines = handler_sections(plan.handlers(TargetHook::InvokeBefore));
        lines.push("await _next(context);".to_string());
        lines.extend(handler_sections(plan.handlers(TargetHook::InvokeAfter)));
        outline
            .members
            .push(method("public async Task InvokeAsync(HttpContext context)", &lines));

        self.services.startup.add_middleware(&decl.qualified_name());
        outline.render()
    }
}

/// Non-lifecycle members in original order.
fn passthrough(decl: &TypeDecl, plan: &LifecyclePlan) -> Vec<String> {
    decl.members
        .iter()
        .enumerate()
        .filter(|(idx, _)| !plan.is_moved(*idx))
        .map(|(_, member)| member.text.clone())
        .collect()
}

fn next_delegate_members(class_name: &str) -> Vec<String> {
    vec![
        "private readonly RequestDelegate _next;".to_string(),
        method(
            &format!("public {class_name}(RequestDelegate next)"),
            &["_next = next;".to_string()],
        ),
    ]
}

fn is_process_request(method: &MethodDecl) -> bool {
    method.name == "ProcessRequest" && method.parameters.len() == 1
}

fn invoke_from_process_request(process: &MethodDecl) -> String {
    let parameter = &process.parameters[0];
    let mut lines = vec![format!(
        "// Migrated from ProcessRequest({} {})",
        parameter.type_name, parameter.name
    )];
    lines.extend(process.body_lines());
    lines.push("await Task.CompletedTask;".to_string());
    method(
        &format!("public async Task InvokeAsync(HttpContext {})", parameter.name),
        &lines,
    )
}

fn signature_of(method: &MethodDecl) -> String {
    let mut parts: Vec<String> = method.modifiers.clone();
    parts.push(method.return_type.clone());
    let parameters: Vec<String> = method
        .parameters
        .iter()
        .map(|param| format!("{} {}", param.type_name, param.name))
        .collect();
    parts.push(format!("{}({})", method.name, parameters.join(", ")));
    parts.join(" ")
}

fn is_legacy_namespace(namespace: &str) -> bool {
    namespace == "System.Web" || namespace.starts_with("System.Web.")
}

fn add_using(usings: &mut Vec<String>, namespace: &str) {
    let directive = format!("using {namespace};");
    if !usings.iter().any(|using| using == &directive) {
        usings.push(directive);
    }
}
