use crate::config::Config;

/// Install backend dependencies, run Prisma and compile.
///
/// Prisma generate and migrate failures only print a warning; the
/// TypeScript build is fatal.
#[must_use]
pub fn render_backend(config: &Config) -> String {
    super::script(&[("DEPLOY_PATH", &config.deployment_path)], BACKEND_BODY)
}

/// Clean and rebuild the Next.js frontend.
#[must_use]
pub fn render_frontend(config: &Config) -> String {
    super::script(&[("DEPLOY_PATH", &config.deployment_path)], FRONTEND_BODY)
}

const BACKEND_BODY: &str = r#"
echo "Building backend application..."
cd "$DEPLOY_PATH/backend"

echo "Installing backend dependencies..."
npm ci --production=false

echo "Generating Prisma client..."
npx prisma generate || echo "Warning: prisma generate failed, continuing"

echo "Running database migrations..."
npx prisma migrate deploy || echo "Warning: migrations failed, continuing"

echo "Building TypeScript..."
npm run build

echo "Backend build complete"
"#;

const FRONTEND_BODY: &str = r#"
echo "Building frontend application..."
cd "$DEPLOY_PATH/frontend"

echo "Cleaning old frontend build..."
rm -rf node_modules .next .next.tmp
npm cache clean --force 2>/dev/null || true

echo "Installing frontend dependencies..."
npm install --legacy-peer-deps || npm install

echo "Building Next.js application..."
export NODE_OPTIONS="--max-old-space-size=4096"
npm run build

echo "Frontend build complete"
"#;
