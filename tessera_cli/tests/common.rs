use assert_cmd::Command;
use insta_cmd::get_cargo_bin;

pub fn tessera_cmd() -> Command {
	let mut cmd = Command::new(get_cargo_bin("tessera"));
	cmd.env("NO_COLOR", "1");
	cmd.env_remove("TESSERA_LOG");
	cmd
}

pub fn write_template(root: &std::path::Path, id: &str, body: &str) -> std::io::Result<()> {
	let path = root.join(id);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	std::fs::write(path, body)
}
