use std::path::Path;
use std::thread;

use formport::markup::{Node, parse};
use formport::{
    AggregateSnapshot, DirectiveConverter, MigrationServices, TagConverter, TemplateCatalog,
    ViewKind,
};
use pretty_assertions::assert_eq;

struct Fixture {
    relative: &'static str,
    kind: ViewKind,
    text: &'static str,
}

const FIXTURES: &[Fixture] = &[
    Fixture {
        relative: "Default.aspx",
        kind: ViewKind::Page,
        text: "<%@ Page MasterPageFile=\"~/Site.Master\" %>\n<%@ Register Src=\"~/Controls/Counter.ascx\" TagName=\"Counter\" TagPrefix=\"uc\" %>\n<uc:Counter runat=\"server\" />\n",
    },
    Fixture {
        relative: "Orders/List.aspx",
        kind: ViewKind::Page,
        text: "<%@ Page %>\n<%@ Import Namespace=\"Shop.Data\" %>\n<asp:GridView ID=\"Orders\" runat=\"server\"></asp:GridView>\n",
    },
    Fixture {
        relative: "Admin/Users.aspx",
        kind: ViewKind::Page,
        text: "<%@ Page %>\n<%@ Import Namespace=\"Shop.Security\" %>\n<%@ Register TagPrefix=\"ajax\" Namespace=\"Shop.Widgets\" Assembly=\"Shop\" %>\n<asp:GridView ID=\"Users\" runat=\"server\" />\n",
    },
    Fixture {
        relative: "Controls/Counter.ascx",
        kind: ViewKind::Control,
        text: "<%@ Control %>\n<%@ Import Namespace=\"Shop.Data\" %>\n<span><%= Count %></span>\n",
    },
];

fn directive_bodies(nodes: &[Node], out: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Directive(body) => out.push(body.clone()),
            Node::Element(element) => directive_bodies(&element.children, out),
            _ => {}
        }
    }
}

fn convert(fixture: &Fixture, catalog: &TemplateCatalog, services: &MigrationServices) {
    let relative = Path::new(fixture.relative);
    let mut document = parse(fixture.text);
    let mut bodies = Vec::new();
    directive_bodies(&document.nodes, &mut bodies);
    DirectiveConverter::new(relative, "Shop", fixture.kind, services).convert_all(&bodies);
    let mut tags = TagConverter::new(catalog, services, relative);
    document.rewrite(&mut tags).unwrap();
}

fn sequential(order: &[usize], catalog: &TemplateCatalog) -> AggregateSnapshot {
    let services = MigrationServices::new();
    for &idx in order {
        convert(&FIXTURES[idx], catalog, &services);
    }
    services.snapshot()
}

#[test]
fn aggregate_content_is_independent_of_file_order() {
    let catalog = TemplateCatalog::embedded().unwrap();
    let baseline = sequential(&[0, 1, 2, 3], &catalog);

    assert_eq!(
        baseline.imports,
        vec![
            "Microsoft.AspNetCore.Components.QuickGrid",
            "Shop.Controls",
            "Shop.Data",
            "Shop.Security"
        ]
    );
    assert_eq!(baseline.packages, vec!["Microsoft.AspNetCore.Components.QuickGrid"]);
    assert_eq!(baseline.registry.keys().collect::<Vec<_>>(), vec!["uc:counter"]);

    for order in [[3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]] {
        assert_eq!(sequential(&order, &catalog), baseline);
    }
}

#[test]
fn aggregate_content_is_independent_of_thread_interleaving() {
    let catalog = TemplateCatalog::embedded().unwrap();
    let baseline = sequential(&[0, 1, 2, 3], &catalog);

    for _ in 0..8 {
        let services = MigrationServices::new();
        thread::scope(|scope| {
            for fixture in FIXTURES.iter().rev() {
                let services = services.clone();
                let catalog = &catalog;
                scope.spawn(move || convert(fixture, catalog, &services));
            }
        });
        assert_eq!(services.snapshot(), baseline);
    }
}
