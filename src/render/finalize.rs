use crate::config::Config;

/// Fix ownership and permissions, then verify PM2, Apache, the
/// certificate and the listening ports and print a summary.
#[must_use]
pub fn render(config: &Config) -> String {
    let backend_port = config.backend_port.to_string();
    let frontend_port = config.frontend_port.to_string();

    super::script(
        &[
            ("DEPLOY_PATH", &config.deployment_path),
            ("SSH_USER", &config.user),
            ("DOMAIN", &config.domain),
            ("APP_NAME", &config.app_name),
            ("BACKEND_PORT", &backend_port),
            ("FRONTEND_PORT", &frontend_port),
        ],
        BODY,
    )
}

const BODY: &str = r#"
echo "Finalizing setup..."

if id apache > /dev/null 2>&1; then
    APACHE_USER="apache"
    APACHE_SERVICE="httpd"
    APACHE_LOG_DIR="/var/log/httpd"
elif id www-data > /dev/null 2>&1; then
    APACHE_USER="www-data"
    APACHE_SERVICE="apache2"
    APACHE_LOG_DIR="/var/log/apache2"
else
    APACHE_USER="root"
    if systemctl is-active --quiet httpd 2>/dev/null; then
        APACHE_SERVICE="httpd"
        APACHE_LOG_DIR="/var/log/httpd"
    else
        APACHE_SERVICE="apache2"
        APACHE_LOG_DIR="/var/log/apache2"
    fi
fi

echo "Setting file permissions..."
chown -R "$SSH_USER:$SSH_USER" "$DEPLOY_PATH"

UPLOADS="$DEPLOY_PATH/backend/public/assets/uploads"
mkdir -p "$UPLOADS"
chown -R "$APACHE_USER:$APACHE_USER" "$UPLOADS" 2>/dev/null \
    || chown -R "$SSH_USER:$SSH_USER" "$UPLOADS"

find "$DEPLOY_PATH" -path "$DEPLOY_PATH/*/node_modules" -prune -o -type d -exec chmod 755 {} +
find "$DEPLOY_PATH" -path "$DEPLOY_PATH/*/node_modules" -prune -o -type f -exec chmod 644 {} +
chmod 775 "$UPLOADS"

chmod 600 "$DEPLOY_PATH/backend/.env" 2>/dev/null || true
chmod 600 "$DEPLOY_PATH/frontend/.env.production" 2>/dev/null || true

echo "Verifying PM2 processes..."
pm2 list

echo "Verifying Apache status..."
systemctl status "$APACHE_SERVICE" --no-pager | head -5 || true

echo "Verifying SSL certificate..."
CERT="/etc/letsencrypt/live/$DOMAIN/fullchain.pem"
if [ -f "$CERT" ]; then
    openssl x509 -in "$CERT" -noout -dates || true
else
    echo "Warning: SSL certificate not found"
fi

echo "Verifying listening ports..."
PORTS=":(80|443|$FRONTEND_PORT|$BACKEND_PORT) "
netstat -tulpn 2>/dev/null | grep -E "$PORTS" || ss -tulpn | grep -E "$PORTS" || true

echo "Testing Apache configuration..."
if [ "$APACHE_SERVICE" = "httpd" ]; then
    httpd -t || echo "Warning: Apache config test failed"
else
    apache2ctl configtest || echo "Warning: Apache config test failed"
fi

echo ""
echo "Deployment summary"
echo "  Application: $APP_NAME"
echo "  Domain:      https://$DOMAIN"
echo "  Frontend:    port $FRONTEND_PORT (proxied from /)"
echo "  Backend:     port $BACKEND_PORT (proxied from /api)"
echo "  WebSocket:   /socket.io"
echo ""
echo "Useful commands:"
echo "  pm2 list | pm2 logs | pm2 restart all"
echo "  tail -f $APACHE_LOG_DIR/${APP_NAME}_ssl_error.log"
echo ""
echo "Final setup complete"
"#;
