//! Legacy event → target hook tables and handler collection.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::analysis::{MemberKind, MethodDecl, TypeDecl};

/// Hooks a lifecycle handler body can be moved into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TargetHook {
    SetParametersAsync,
    OnInitialized,
    OnAfterRender,
    Dispose,
    ConfigureServices,
    /// Inside the `app.Use` middleware, before `next()`.
    ConfigureBefore,
    /// Inside the `app.Use` middleware, after `next()`.
    ConfigureAfter,
    /// Inside `InvokeAsync`, before the next delegate runs.
    InvokeBefore,
    /// Inside `InvokeAsync`, after the next delegate returns.
    InvokeAfter,
}

#[derive(Clone, Copy, Debug)]
pub struct LifecycleEvent {
    pub event: &'static str,
    pub hook: TargetHook,
}

const fn event(event: &'static str, hook: TargetHook) -> LifecycleEvent {
    LifecycleEvent { event, hook }
}

/// Event table for one class variant. Handlers are recognised by
/// `<prefix><Event>` names and the two-parameter handler convention.
#[derive(Debug)]
pub struct LifecycleMap {
    pub handler_prefixes: &'static [&'static str],
    pub events: &'static [LifecycleEvent],
    /// Handlers may also be wired by `+=` subscriptions inside `Init`.
    pub subscriptions: bool,
}

pub static PAGE_LIFECYCLE: LifecycleMap = LifecycleMap {
    handler_prefixes: &["Page_"],
    events: &[
        event("PreInit", TargetHook::SetParametersAsync),
        event("Init", TargetHook::SetParametersAsync),
        event("InitComplete", TargetHook::SetParametersAsync),
        event("PreLoad", TargetHook::SetParametersAsync),
        event("Load", TargetHook::OnInitialized),
        event("LoadComplete", TargetHook::OnInitialized),
        event("PreRender", TargetHook::OnAfterRender),
        event("PreRenderComplete", TargetHook::OnAfterRender),
        event("SaveStateComplete", TargetHook::OnAfterRender),
        event("Unload", TargetHook::Dispose),
    ],
    subscriptions: false,
};

pub static APPLICATION_LIFECYCLE: LifecycleMap = LifecycleMap {
    handler_prefixes: &["Application_"],
    events: &[
        event("Start", TargetHook::ConfigureServices),
        event("BeginRequest", TargetHook::ConfigureBefore),
        event("AuthenticateRequest", TargetHook::ConfigureBefore),
        event("AuthorizeRequest", TargetHook::ConfigureBefore),
        event("EndRequest", TargetHook::ConfigureAfter),
    ],
    subscriptions: false,
};

pub static MODULE_LIFECYCLE: LifecycleMap = LifecycleMap {
    handler_prefixes: &["Application_", "On"],
    events: &[
        event("BeginRequest", TargetHook::InvokeBefore),
        event("AuthenticateRequest", TargetHook::InvokeBefore),
        event("PostAuthenticateRequest", TargetHook::InvokeBefore),
        event("AuthorizeRequest", TargetHook::InvokeBefore),
        event("PostAuthorizeRequest", TargetHook::InvokeBefore),
        event("AcquireRequestState", TargetHook::InvokeBefore),
        event("PreRequestHandlerExecute", TargetHook::InvokeBefore),
        event("PostRequestHandlerExecute", TargetHook::InvokeAfter),
        event("ReleaseRequestState", TargetHook::InvokeAfter),
        event("UpdateRequestCache", TargetHook::InvokeAfter),
        event("EndRequest", TargetHook::InvokeAfter),
    ],
    subscriptions: true,
};

fn subscription_regex() -> &'static Regex {
    static SUBSCRIPTION: OnceLock<Regex> = OnceLock::new();
    SUBSCRIPTION.get_or_init(|| {
        Regex::new(
            r"\.\s*([A-Za-z_]\w*)\s*\+=\s*(?:new\s+[\w.]+\s*\(\s*)?(?:this\s*\.\s*)?([A-Za-z_]\w*)\s*\)?\s*;",
        )
        .expect("subscription regex is valid")
    })
}

/// One handler whose body moves into a hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MovedHandler {
    pub member_index: usize,
    pub name: String,
    pub lines: Vec<String>,
}

/// Handlers grouped by hook, each group in event-table order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LifecyclePlan {
    pub hooks: BTreeMap<TargetHook, Vec<MovedHandler>>,
    /// `Init` member whose subscriptions were consumed, with the lines left
    /// after removing them.
    pub init_rewrite: Option<(usize, Vec<String>)>,
}

impl LifecyclePlan {
    pub fn has(&self, hook: TargetHook) -> bool {
        self.hooks.get(&hook).is_some_and(|handlers| !handlers.is_empty())
    }

    pub fn handlers(&self, hook: TargetHook) -> &[MovedHandler] {
        self.hooks.get(&hook).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_moved(&self, member_index: usize) -> bool {
        self.hooks
            .values()
            .flatten()
            .any(|handler| handler.member_index == member_index)
    }
}

impl LifecycleMap {
    fn event_for_name(&self, method: &str) -> Option<usize> {
        self.handler_prefixes.iter().find_map(|prefix| {
            let event = strip_prefix_ignore_case(method, prefix)?;
            self.events
                .iter()
                .position(|known| known.event.eq_ignore_ascii_case(event))
        })
    }

    fn event_for_subscription(&self, event: &str) -> Option<usize> {
        self.events
            .iter()
            .position(|known| known.event.eq_ignore_ascii_case(event))
    }

    /// Finds every handler in `decl` and plans where its body goes.
    pub fn plan(&self, decl: &TypeDecl) -> LifecyclePlan {
        let methods: Vec<(usize, &MethodDecl)> = decl
            .members
            .iter()
            .enumerate()
            .filter_map(|(idx, member)| match &member.kind {
                MemberKind::Method(method) => Some((idx, method)),
                _ => None,
            })
            .collect();

        let mut subscribed: BTreeMap<String, usize> = BTreeMap::new();
        let mut init_rewrite = None;
        if self.subscriptions {
            if let Some((idx, init)) = methods
                .iter()
                .find(|(_, method)| method.name == "Init" && method.parameters.len() == 1)
            {
                let mut remaining = Vec::new();
                for line in init.body_lines() {
                    match subscription_regex().captures(&line) {
                        Some(caps) => match self.event_for_subscription(&caps[1]) {
                            Some(event) => {
                                subscribed.insert(caps[2].to_string(), event);
                            }
                            None => remaining.push(line),
                        },
                        None => remaining.push(line),
                    }
                }
                if !subscribed.is_empty() {
                    init_rewrite = Some((*idx, remaining));
                }
            }
        }

        let mut found: Vec<(usize, usize, &MethodDecl)> = methods
            .iter()
            .filter(|(_, method)| method.is_event_handler())
            .filter_map(|(idx, method)| {
                let event = subscribed
                    .get(&method.name)
                    .copied()
                    .or_else(|| self.event_for_name(&method.name))?;
                Some((event, *idx, *method))
            })
            .collect();
        found.sort_by_key(|(event, idx, _)| (*event, *idx));

        let mut plan = LifecyclePlan {
            init_rewrite,
            ..LifecyclePlan::default()
        };
        for (event, idx, method) in found {
            plan.hooks
                .entry(self.events[event].hook)
                .or_default()
                .push(MovedHandler {
                    member_index: idx,
                    name: method.name.clone(),
                    lines: method.body_lines(),
                });
        }
        plan
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Member, Parameter, TypeKind};

    fn handler(name: &str, body: &str) -> Member {
        Member {
            kind: MemberKind::Method(MethodDecl {
                name: name.into(),
                modifiers: vec!["protected".into()],
                return_type: "void".into(),
                parameters: vec![
                    Parameter {
                        type_name: "object".into(),
                        name: "sender".into(),
                    },
                    Parameter {
                        type_name: "EventArgs".into(),
                        name: "e".into(),
                    },
                ],
                body: Some(format!("{{\n    {body}\n}}")),
            }),
            text: format!("protected void {name}(object sender, EventArgs e) {{ {body} }}"),
        }
    }

    fn decl(members: Vec<Member>) -> TypeDecl {
        TypeDecl {
            name: "Home".into(),
            namespace: None,
            kind: TypeKind::Class,
            modifiers: vec![],
            attributes: vec![],
            base_list: vec![],
            members,
            text: String::new(),
        }
    }

    #[test]
    fn handlers_concatenate_in_event_order_not_declaration_order() {
        let plan = PAGE_LIFECYCLE.plan(&decl(vec![
            handler("Page_LoadComplete", "B();"),
            handler("Page_Load", "A();"),
            handler("Page_Unload", "C();"),
            handler("Button_Click", "D();"),
        ]));

        let names: Vec<_> = plan
            .handlers(TargetHook::OnInitialized)
            .iter()
            .map(|h| h.name.as_str())
            .collect();
        assert_eq!(names, vec!["Page_Load", "Page_LoadComplete"]);
        assert!(plan.has(TargetHook::Dispose));
        assert!(!plan.has(TargetHook::SetParametersAsync));
        assert!(!plan.is_moved(3));
    }

    #[test]
    fn module_subscriptions_route_custom_handler_names() {
        let mut members = vec![
            handler("HandleStart", "Stamp();"),
            handler("OnEndRequest", "Flush();"),
        ];
        members.push(Member {
            kind: MemberKind::Method(MethodDecl {
                name: "Init".into(),
                modifiers: vec!["public".into()],
                return_type: "void".into(),
                parameters: vec![Parameter {
                    type_name: "HttpApplication".into(),
                    name: "context".into(),
                }],
                body: Some(
                    "{\n    context.BeginRequest += new EventHandler(HandleStart);\n    Setup();\n}"
                        .into(),
                ),
            }),
            text: String::new(),
        });

        let plan = MODULE_LIFECYCLE.plan(&decl(members));
        assert_eq!(plan.handlers(TargetHook::InvokeBefore)[0].name, "HandleStart");
        assert_eq!(plan.handlers(TargetHook::InvokeAfter)[0].name, "OnEndRequest");
        assert_eq!(plan.init_rewrite, Some((2, vec!["Setup();".to_string()])));
    }
}
