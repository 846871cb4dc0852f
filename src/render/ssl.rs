use crate::config::Config;

/// Obtain a Let's Encrypt certificate for the domain unless one is
/// already present, and make sure renewal is scheduled.
#[must_use]
pub fn render(config: &Config) -> String {
    super::script(
        &[("DOMAIN", &config.domain), ("CERT_EMAIL", &config.cert_email)],
        BODY,
    )
}

const BODY: &str = r#"
CERT="/etc/letsencrypt/live/$DOMAIN/fullchain.pem"

echo "Setting up SSL certificate for $DOMAIN..."

if systemctl is-active --quiet httpd 2>/dev/null; then
    APACHE_SERVICE="httpd"
elif systemctl is-active --quiet apache2 2>/dev/null; then
    APACHE_SERVICE="apache2"
else
    APACHE_SERVICE="httpd"
fi

if [ -f "$CERT" ]; then
    echo "SSL certificate already exists, skipping acquisition"
else
    if [ -x /usr/local/cpanel/bin/whmapi1 ]; then
        echo "cPanel detected, trying AutoSSL..."
        /usr/local/cpanel/bin/whmapi1 set_autossl_provider provider=LetsEncrypt 2>/dev/null || true

        CPANEL_USER=$(ls /var/cpanel/users/ 2>/dev/null | head -1)
        if [ -n "$CPANEL_USER" ]; then
            /scripts/autossl_check --user="$CPANEL_USER" 2>/dev/null || true
        fi

        if [ -f "$CERT" ] || [ -f "/var/cpanel/ssl/apache_tls/$DOMAIN/combined" ]; then
            echo "Certificate obtained using cPanel AutoSSL"
        else
            echo "cPanel AutoSSL did not install a certificate, falling back to certbot"
        fi
    fi

    if [ ! -f "$CERT" ]; then
        systemctl start "$APACHE_SERVICE" 2>/dev/null || true
        sleep 2

        if certbot --apache --non-interactive --agree-tos --email "$CERT_EMAIL" -d "$DOMAIN" 2>/dev/null; then
            echo "Certificate obtained using certbot Apache plugin"
        else
            echo "Apache plugin failed, trying standalone mode..."
            systemctl stop "$APACHE_SERVICE" 2>/dev/null || true

            if certbot certonly --standalone --non-interactive --agree-tos --email "$CERT_EMAIL" -d "$DOMAIN"; then
                echo "Certificate obtained using certbot standalone mode"
                systemctl start "$APACHE_SERVICE" 2>/dev/null || true
            else
                echo "Failed to obtain SSL certificate"
                echo "Check that DNS for $DOMAIN points to this server and ports 80 and 443 are open"
                systemctl start "$APACHE_SERVICE" 2>/dev/null || true
                exit 1
            fi
        fi
    fi
fi

if command -v crontab > /dev/null 2>&1; then
    if ! crontab -l 2>/dev/null | grep -q "certbot renew"; then
        (crontab -l 2>/dev/null; echo "0 0,12 * * * certbot renew --quiet --post-hook 'systemctl reload $APACHE_SERVICE'") | crontab - 2>/dev/null \
            || echo "Could not create renewal cron job, set up renewal manually"
    fi
else
    echo "crontab not available, relying on certbot's systemd timer for renewal"
fi

echo "SSL setup complete"
"#;
