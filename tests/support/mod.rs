// Helper functions are shared across multiple test crates; not every helper is
// referenced in each test module.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

pub(crate) const SECRET_TEMPLATE: &str = r#"jupyterhub:
  hub:
    services:
      binder:
        apiToken: "<api-token>"
  proxy:
    secretToken: "<secret-token>"
registry:
  username: <sp-app-id>
  password: <sp-app-key>
"#;

pub(crate) const CONFIG_TEMPLATE: &str = r"config:
  BinderHub:
    hub_url: http://<jupyterhub-ip>
    use_registry: true
";

pub(crate) const PROXY_IP: &str = "20.68.1.42";

/// Secrets known to the fake `az`; anything else is reported as not found.
pub(crate) const VAULT_SECRETS: &[(&str, &str)] = &[
    ("apiToken", "api-token-value"),
    ("secretToken", "secret-token-value"),
    ("SP-appID", "00000000-app-id"),
    ("SP-key", "service-principal-key"),
    ("ssh-public-key", "ssh-rsa AAAAB3Nza hub23"),
    ("github-client-id", "gh-client"),
    ("github-client-secret", "gh-secret"),
];

pub(crate) struct Workspace {
    pub(crate) root: tempfile::TempDir,
    pub(crate) bin: PathBuf,
}

impl Workspace {
    pub(crate) fn new() -> Result<Self> {
        let root = tempfile::tempdir().context("Failed to create workspace")?;
        let bin = root.path().join("bin");
        fs::create_dir_all(&bin).context("Failed to create fake bin dir")?;
        let deploy = root.path().join("deploy");
        fs::create_dir_all(&deploy).context("Failed to create deploy dir")?;
        fs::write(deploy.join("secret-template.yaml"), SECRET_TEMPLATE)
            .context("Failed to write secret template")?;
        fs::write(deploy.join("config-template.yaml"), CONFIG_TEMPLATE)
            .context("Failed to write config template")?;
        Ok(Self { root, bin })
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn calls_log(&self) -> PathBuf {
        self.root.path().join("calls.log")
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.calls_log())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub(crate) fn run(&self, args: &[&str]) -> (String, String, i32) {
        self.run_with_env(args, &[])
    }

    pub(crate) fn run_with_env(&self, args: &[&str], envs: &[(&str, &str)]) -> (String, String, i32) {
        let path = std::env::var("PATH").unwrap_or_default();
        let combined_path = format!("{}:{path}", self.bin.display());
        let output = Command::new(env!("CARGO_BIN_EXE_hubops"))
            .args(args)
            .current_dir(self.path())
            .env("PATH", combined_path)
            .env_remove("RUST_LOG")
            .envs(envs.iter().copied())
            .output()
            .expect("hubops binary runs in tests");
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let code = output.status.code().unwrap_or(-1);
        (stdout, stderr, code)
    }
}

pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\nset -eu\n{body}\n"))
        .with_context(|| format!("Failed to write fake {name} script"))?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o700))
        .with_context(|| format!("Failed to set fake {name} permissions"))?;
    Ok(path)
}

fn log_call(ws: &Workspace, name: &str) -> String {
    format!(
        "printf '%s\\n' \"{name} $*\" >> '{}'",
        ws.calls_log().display()
    )
}

/// Fake `az` serving `keyvault secret show` from `secrets` and accepting
/// login/account/aks calls.
pub(crate) fn write_fake_az(ws: &Workspace, secrets: &[(&str, &str)]) -> Result<PathBuf> {
    let mut cases = String::new();
    for (name, value) in secrets {
        cases.push_str(&format!("    {name}) printf '\"%s\"\\n' '{value}' ;;\n"));
    }
    let body = format!(
        r#"{log}
if [ "${{1:-}}" = "keyvault" ] && [ "${{2:-}}" = "secret" ] && [ "${{3:-}}" = "show" ]; then
  name="$7"
  case "$name" in
{cases}    *) echo "ERROR: (SecretNotFound) A secret with (name/id) $name was not found in this key vault." >&2; exit 3 ;;
  esac
  exit 0
fi
exit 0"#,
        log = log_call(ws, "az"),
    );
    write_script(&ws.bin, "az", &body)
}

/// Fake `kubectl` reporting `address` (or pending when `None`) for any service.
pub(crate) fn write_fake_kubectl(ws: &Workspace, address: Option<&str>) -> Result<PathBuf> {
    let ingress = match address {
        Some(ip) => format!(r#"[{{"ip":"{ip}"}}]"#),
        None => "[]".to_string(),
    };
    let body = format!(
        r#"{log}
if [ "${{1:-}}" = "get" ] && [ "${{2:-}}" = "service" ]; then
  printf '%s\n' '{{"kind":"Service","status":{{"loadBalancer":{{"ingress":{ingress}}}}}}}'
  exit 0
fi
if [ "${{1:-}}" = "get" ] && [ "${{2:-}}" = "pods" ]; then
  printf 'NAME READY STATUS\nbinder-abc 1/1 Running\n'
  exit 0
fi
exit 0"#,
        log = log_call(ws, "kubectl"),
    );
    write_script(&ws.bin, "kubectl", &body)
}

/// Fake `kubectl` that reports the service as pending for the first
/// `pending_queries` lookups and as `address` afterwards.
pub(crate) fn write_fake_kubectl_assigned_after(
    ws: &Workspace,
    pending_queries: u32,
    address: &str,
) -> Result<PathBuf> {
    let counter = ws.path().join("kubectl.count");
    let body = format!(
        r#"{log}
if [ "${{1:-}}" = "get" ] && [ "${{2:-}}" = "service" ]; then
  count=$(cat '{counter}' 2>/dev/null || echo 0)
  echo $((count + 1)) > '{counter}'
  if [ "$count" -lt {pending_queries} ]; then
    ingress='[]'
  else
    ingress='[{{"ip":"{address}"}}]'
  fi
  printf '{{"kind":"Service","status":{{"loadBalancer":{{"ingress":%s}}}}}}\n' "$ingress"
  exit 0
fi
exit 0"#,
        log = log_call(ws, "kubectl"),
        counter = counter.display(),
    );
    write_script(&ws.bin, "kubectl", &body)
}

pub(crate) fn write_fake_helm(ws: &Workspace, exit_code: i32) -> Result<PathBuf> {
    let body = format!(
        r#"{log}
if [ "${{1:-}}" = "upgrade" ]; then
  echo "Release has been upgraded."
  exit {exit_code}
fi
exit 0"#,
        log = log_call(ws, "helm"),
    );
    write_script(&ws.bin, "helm", &body)
}

pub(crate) fn write_fake_terraform(
    ws: &Workspace,
    plan_exit: i32,
    apply_exit: i32,
) -> Result<PathBuf> {
    let body = format!(
        r#"{log}
case "${{2:-}}" in
  plan) exit {plan_exit} ;;
  apply) exit {apply_exit} ;;
esac
exit 0"#,
        log = log_call(ws, "terraform"),
    );
    write_script(&ws.bin, "terraform", &body)
}
