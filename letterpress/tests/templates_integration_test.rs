//! Integration tests for templates and the template registry

use std::fs;
use std::path::Path;
use std::sync::Arc;

use letterpress::config::TemplateDirConfig;
use letterpress::templates::SimpleRendererFactory;
use letterpress::{values, Attachment, MailError, Message, MessageOptions, Template, TemplateRegistry, Values};
use tempfile::TempDir;

const JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF";

fn render_signup(signup: &Template) -> Message {
    signup
        .build_message(
            ["kolypto@gmail.com"],
            &values([("user", "Honored User")]),
            MessageOptions::new().attachment(Attachment::new("kolypto.gpg", "123")),
        )
        .unwrap()
}

fn check_signup(message: &Message) {
    let wire = message.serialize().unwrap();

    assert!(wire.contains("Subject: =?utf-8?q?Hello_Honored_User_=C2=B0C?=\r\n"));
    assert!(wire.contains("To: kolypto@gmail.com\r\n"));
    assert!(wire.contains("You are signed up -- <img src=\"cid:flower.jpg\" /> localhost"));

    assert!(wire.contains("Content-Disposition: inline; filename=\"flower.jpg\"\r\n"));
    assert!(wire.contains("Content-Type: image/jpeg\r\n"));
    assert!(wire.contains("Content-ID: <flower.jpg>\r\n"));

    assert!(wire.contains("Content-Disposition: attachment; filename=\"kolypto.gpg\"\r\n"));
    assert!(wire.contains("Content-Type: application/octet-stream\r\n"));

    // Template attachments precede per-message ones
    let flower = wire.find("flower.jpg\"").unwrap();
    let gpg = wire.find("kolypto.gpg").unwrap();
    assert!(flower < gpg);
}

fn write_signup_dir(root: &Path) {
    fs::create_dir_all(root).unwrap();
    fs::write(root.join("subject.txt"), "Hello $user °C\n").unwrap();
    fs::write(
        root.join("index.htm"),
        "You are signed up -- <img src=\"cid:flower.jpg\" /> $domain",
    )
    .unwrap();
    fs::write(root.join("i-flower.jpg"), JPEG).unwrap();
    fs::write(root.join(".swp"), "ignored").unwrap();
    fs::create_dir_all(root.join("drafts")).unwrap();
}

#[test]
fn test_template() {
    let signup = Template::new("Hello $user °C")
        .with_html("You are signed up -- <img src=\"cid:flower.jpg\" /> $domain")
        .with_attachment(Attachment::inline_image("flower.jpg", JPEG))
        .with_defaults(values([("domain", "localhost")]));

    check_signup(&render_signup(&signup));
    assert_eq!(signup.attachments().len(), 1);
}

#[test]
fn test_from_directory() {
    let dir = TempDir::new().unwrap();
    let signup_dir = dir.path().join("signup");
    write_signup_dir(&signup_dir);

    let signup = Template::from_directory(&signup_dir, &TemplateDirConfig::default()).unwrap();
    signup.defaults(values([("domain", "localhost")]));

    assert_eq!(signup.subject(), "Hello $user °C");
    assert_eq!(signup.text(), None);
    check_signup(&render_signup(&signup));
}

#[test]
fn test_missing_value_reported() {
    let template = Template::new("Hello $user").with_text("Visit $domain");
    let result = template.build_message(
        ["u@example.com"],
        &values([("user", "Ann")]),
        MessageOptions::new(),
    );
    assert!(matches!(result, Err(MailError::MissingValue(name)) if name == "domain"));
}

#[test]
fn test_registry_scenario() {
    let mut registry = TemplateRegistry::new();
    registry.defaults(values([("domain", "example.com")]));

    registry
        .add("welcome", Template::new("Welcome to $domain, $user"))
        .unwrap();
    registry
        .add("bye", Template::new("Goodbye $user").with_text("See you on $domain"))
        .unwrap();
    registry.set_renderer(Arc::new(SimpleRendererFactory)).unwrap();

    let welcome = registry
        .build_message(
            "welcome",
            ["u@example.com"],
            &values([("user", "Ann")]),
            MessageOptions::new(),
        )
        .unwrap();
    assert_eq!(welcome.subject(), "Welcome to example.com, Ann");

    let bye = registry
        .get("bye")
        .unwrap()
        .build_message(["u@example.com"], &values([("user", "Ann")]), MessageOptions::new())
        .unwrap();
    assert_eq!(bye.text(), Some("See you on example.com"));

    assert!(matches!(
        registry.add("welcome", Template::new("again")),
        Err(MailError::DuplicateName(_))
    ));
    assert!(matches!(registry.get("missing"), Err(MailError::NotFound(_))));
}

#[test]
fn test_registry_from_directory() {
    let dir = TempDir::new().unwrap();
    write_signup_dir(&dir.path().join("signup"));

    let other = dir.path().join("reset");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("subject.txt"), "Reset your password").unwrap();
    fs::write(other.join("index.txt"), "Follow $link").unwrap();

    fs::create_dir_all(dir.path().join(".git")).unwrap();
    fs::write(dir.path().join("README"), "not a template").unwrap();

    let mut registry =
        TemplateRegistry::from_directory(dir.path(), &TemplateDirConfig::default()).unwrap();
    assert_eq!(registry.names().collect::<Vec<_>>(), vec!["reset", "signup"]);

    registry.defaults(values([("domain", "localhost")]));
    check_signup(&render_signup(&registry.get("signup").unwrap()));

    let reset = registry
        .build_message(
            "reset",
            ["u@example.com"],
            &values([("link", "https://example.com/r/1")]),
            MessageOptions::new(),
        )
        .unwrap();
    assert_eq!(reset.text(), Some("Follow https://example.com/r/1"));
    assert_eq!(reset.html(), None);
}

#[test]
fn test_registry_directory_missing_subject() {
    let dir = TempDir::new().unwrap();
    let broken = dir.path().join("broken");
    fs::create_dir_all(&broken).unwrap();
    fs::write(broken.join("index.txt"), "no subject").unwrap();

    let result = TemplateRegistry::from_directory(dir.path(), &TemplateDirConfig::default());
    assert!(matches!(result, Err(MailError::NotFound(_))));
}

#[test]
fn test_registry_directory_not_found() {
    let result = TemplateRegistry::from_directory("/nonexistent/templates", &TemplateDirConfig::default());
    assert!(matches!(result, Err(MailError::Io(_))));
}

#[test]
fn test_values_override_registry_defaults() {
    let mut registry = TemplateRegistry::new();
    registry.defaults(values([("greeting", "Hello")]));
    registry.add("t", Template::new("$greeting $user")).unwrap();

    let mut overrides: Values = values([("user", "Ann")]);
    overrides.insert("greeting".to_string(), "Howdy".into());

    let message = registry
        .build_message("t", ["u@example.com"], &overrides, MessageOptions::new())
        .unwrap();
    assert_eq!(message.subject(), "Howdy Ann");
}

#[cfg(feature = "minijinja")]
#[test]
fn test_registry_with_minijinja() {
    use letterpress::templates::MiniJinjaFactory;

    let mut registry = TemplateRegistry::new();
    registry.set_renderer(Arc::new(MiniJinjaFactory::default())).unwrap();
    registry
        .add(
            "digest",
            Template::new("{{ items|length }} new items")
                .with_text("{% for item in items %}- {{ item }}\n{% endfor %}"),
        )
        .unwrap();

    let message = registry
        .build_message(
            "digest",
            ["u@example.com"],
            &values([("items", serde_json::json!(["a", "b"]))]),
            MessageOptions::new(),
        )
        .unwrap();
    assert_eq!(message.subject(), "2 new items");
    assert_eq!(message.text(), Some("- a\n- b\n"));
}
