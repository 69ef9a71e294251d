mod common;

use common::write_template;
use serde_json::Value;
use tessera_core::AnyEmptyResult;

#[test]
fn list_prints_registered_templates() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_template(tmp.path(), "app/views/layout.html.jinja", "")?;
	write_template(tmp.path(), "app/views/users/show.html.jinja", "")?;
	write_template(tmp.path(), "app/views/readme.md", "")?;

	common::tessera_cmd()
		.arg("list")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("app/views/layout.html.jinja\napp/views/users/show.html.jinja\n");

	Ok(())
}

#[test]
fn list_json_format() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;
	write_template(tmp.path(), "app/views/layout.html.jinja", "")?;

	let output = common::tessera_cmd()
		.arg("list")
		.arg("--format")
		.arg("json")
		.arg("--path")
		.arg(tmp.path())
		.output()?;
	assert!(output.status.success());

	let ids: Value = serde_json::from_slice(&output.stdout)?;
	assert_eq!(ids, serde_json::json!(["app/views/layout.html.jinja"]));

	Ok(())
}

#[test]
fn list_reports_empty_registry() -> AnyEmptyResult {
	let tmp = tempfile::tempdir()?;

	common::tessera_cmd()
		.arg("list")
		.arg("--path")
		.arg(tmp.path())
		.assert()
		.success()
		.stdout("No templates found.\n");

	Ok(())
}
