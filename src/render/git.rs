use crate::config::Config;

/// Clone the repository into the deployment path, or hard-reset an
/// existing checkout to the configured branch.
#[must_use]
pub fn render_deploy(config: &Config) -> String {
    super::script(
        &[
            ("DEPLOY_PATH", &config.deployment_path),
            ("REPO_URL", &config.repo_url),
            ("BRANCH", &config.branch),
        ],
        DEPLOY_BODY,
    )
}

/// Write the backend and frontend environment files into the
/// checkout, readable by the owner only.
#[must_use]
pub fn render_env_upload(config: &Config) -> String {
    super::script(
        &[
            ("DEPLOY_PATH", &config.deployment_path),
            ("BACKEND_ENV", &config.env_backend),
            ("FRONTEND_ENV", &config.env_frontend),
        ],
        ENV_BODY,
    )
}

const DEPLOY_BODY: &str = r#"
echo "Deploying code from Git repository..."

mkdir -p "$DEPLOY_PATH"
cd "$DEPLOY_PATH"

if [ -d .git ]; then
    echo "Repository exists, pulling latest changes..."
    git remote set-url origin "$REPO_URL"
    git fetch origin
    if ! git reset --hard "origin/$BRANCH"; then
        echo "Warning: branch $BRANCH not found on origin, falling back to main" >&2
        git reset --hard origin/main
    fi
    git clean -fd
else
    echo "Cloning repository (branch $BRANCH)..."
    find "$DEPLOY_PATH" -mindepth 1 -delete
    git clone -b "$BRANCH" "$REPO_URL" "$DEPLOY_PATH"
fi

for dir in backend frontend; do
    if [ ! -d "$DEPLOY_PATH/$dir" ]; then
        echo "Error: $dir directory not found in repository"
        exit 1
    fi
done

echo "Code deployment complete"
"#;

const ENV_BODY: &str = r#"
for dir in backend frontend; do
    if [ ! -d "$DEPLOY_PATH/$dir" ]; then
        echo "Error: $dir directory not found at $DEPLOY_PATH/$dir"
        exit 1
    fi
done

echo "Writing $DEPLOY_PATH/backend/.env"
printf '%s\n' "$BACKEND_ENV" > "$DEPLOY_PATH/backend/.env"
echo "  $(wc -l < "$DEPLOY_PATH/backend/.env") lines"

echo "Writing $DEPLOY_PATH/frontend/.env.production"
printf '%s\n' "$FRONTEND_ENV" > "$DEPLOY_PATH/frontend/.env.production"
echo "  $(wc -l < "$DEPLOY_PATH/frontend/.env.production") lines"

chmod 600 "$DEPLOY_PATH/backend/.env"
chmod 600 "$DEPLOY_PATH/frontend/.env.production"

echo "Environment files uploaded"
"#;
