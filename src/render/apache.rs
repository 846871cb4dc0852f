use std::fmt::Write;

use crate::config::Config;
use crate::shell;

/// Apache flavours the script can find on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// RHEL family: `httpd`, config in `/etc/httpd/conf.d`.
    Httpd,
    /// Debian family: `apache2`, config in `/etc/apache2/sites-available`.
    Apache2,
}

impl Layout {
    #[must_use]
    pub const fn service(self) -> &'static str {
        match self {
            Self::Httpd => "httpd",
            Self::Apache2 => "apache2",
        }
    }

    #[must_use]
    pub const fn conf_dir(self) -> &'static str {
        match self {
            Self::Httpd => "/etc/httpd/conf.d",
            Self::Apache2 => "/etc/apache2/sites-available",
        }
    }

    #[must_use]
    pub const fn log_dir(self) -> &'static str {
        match self {
            Self::Httpd => "/var/log/httpd",
            Self::Apache2 => "/var/log/apache2",
        }
    }
}

/// Port 80 virtual host: redirect everything to HTTPS.
#[must_use]
pub fn http_vhost(config: &Config, layout: Layout) -> String {
    let domain = &config.domain;
    let app = &config.app_name;
    let logs = layout.log_dir();

    format!(
        "<VirtualHost *:80>
    ServerName {domain}
    ServerAlias www.{domain}

    RewriteEngine On
    RewriteCond %{{HTTPS}} off
    RewriteRule ^(.*)$ https://%{{HTTP_HOST}}$1 [R=301,L]

    ErrorLog {logs}/{app}_error.log
    CustomLog {logs}/{app}_access.log combined
</VirtualHost>
"
    )
}

/// Port 443 virtual host: TLS termination, API and uploads to the
/// backend, Socket.IO websocket tunnel, everything else to the
/// frontend.
#[must_use]
pub fn https_vhost(config: &Config, layout: Layout) -> String {
    let domain = &config.domain;
    let app = &config.app_name;
    let logs = layout.log_dir();
    let backend = format!("127.0.0.1:{}", config.backend_port);
    let frontend = format!("127.0.0.1:{}", config.frontend_port);

    let mut out = String::new();
    let _ = write!(
        out,
        "<VirtualHost *:443>
    ServerName {domain}
    ServerAlias www.{domain}

    SSLEngine on
    SSLCertificateFile /etc/letsencrypt/live/{domain}/fullchain.pem
    SSLCertificateKeyFile /etc/letsencrypt/live/{domain}/privkey.pem

    <IfFile \"/etc/letsencrypt/options-ssl-apache.conf\">
        Include /etc/letsencrypt/options-ssl-apache.conf
    </IfFile>
    <IfFile \"!/etc/letsencrypt/options-ssl-apache.conf\">
        SSLProtocol all -SSLv2 -SSLv3 -TLSv1 -TLSv1.1
        SSLCipherSuite ECDHE-ECDSA-AES128-GCM-SHA256:ECDHE-RSA-AES128-GCM-SHA256:ECDHE-ECDSA-AES256-GCM-SHA384:ECDHE-RSA-AES256-GCM-SHA384
        SSLHonorCipherOrder off
        SSLSessionTickets off
    </IfFile>

    <IfModule mod_headers.c>
        Header always set X-Frame-Options \"SAMEORIGIN\"
        Header always set X-Content-Type-Options \"nosniff\"
        Header always set X-XSS-Protection \"1; mode=block\"
        Header always set Referrer-Policy \"strict-origin-when-cross-origin\"
    </IfModule>

    <IfModule mod_proxy.c>
        ProxyPreserveHost On
        ProxyRequests Off

        ProxyPass /api http://{backend}/api nocanon
        ProxyPassReverse /api http://{backend}/api

        ProxyPass /assets/uploads http://{backend}/assets/uploads nocanon
        ProxyPassReverse /assets/uploads http://{backend}/assets/uploads
    </IfModule>

    RewriteEngine On
    <Location /socket.io/>
        RewriteEngine On
        RewriteCond %{{HTTP:Upgrade}} websocket [NC]
        RewriteCond %{{HTTP:Connection}} upgrade [NC]
        RewriteRule .* ws://{backend}%{{REQUEST_URI}} [P,L]

        ProxyPass ws://{backend}/socket.io/
        ProxyPassReverse ws://{backend}/socket.io/
    </Location>

    ProxyPass / http://{frontend}/ nocanon
    ProxyPassReverse / http://{frontend}/

    <IfModule mod_headers.c>
        RequestHeader set X-Forwarded-Proto \"https\"
        RequestHeader set X-Forwarded-Port \"443\"
        RequestHeader set X-Real-IP %{{REMOTE_ADDR}}s
    </IfModule>

    ErrorLog {logs}/{app}_ssl_error.log
    CustomLog {logs}/{app}_ssl_access.log combined
</VirtualHost>
"
    );
    out
}

/// Write both virtual hosts for whichever Apache layout the host
/// has, enable them, test the config and restart Apache.
#[must_use]
pub fn render(config: &Config) -> String {
    let mut branches = String::new();
    for (keyword, layout) in [("if", Layout::Httpd), ("elif", Layout::Apache2)] {
        let dir = layout.conf_dir();
        let _ = write!(
            branches,
            "{keyword} [ -d {dir} ]; then
    APACHE_SERVICE={service}
    HTTP_CONF=\"{dir}/$HTTP_NAME\"
    HTTPS_CONF=\"{dir}/$HTTPS_NAME\"
    {write_http}
    {write_https}
",
            service = layout.service(),
            write_http = shell::write_file("\"$HTTP_CONF\"", &http_vhost(config, layout)),
            write_https = shell::write_file("\"$HTTPS_CONF\"", &https_vhost(config, layout)),
        );
    }

    let body = format!(
        r#"
echo "Configuring Apache reverse proxy for $DOMAIN..."

{branches}else
    echo "Could not determine Apache configuration directory"
    exit 1
fi

if [ -d /etc/apache2/sites-available ]; then
    a2ensite "$HTTP_NAME" "$HTTPS_NAME" 2>/dev/null || true
fi

if [ "$APACHE_SERVICE" = "httpd" ]; then
    httpd -t
else
    apache2ctl configtest
fi

systemctl restart "$APACHE_SERVICE"

echo "Apache configuration complete"
"#
    );

    let http_name = format!("{}-http.conf", config.app_name);
    let https_name = format!("{}-https.conf", config.app_name);
    super::script(
        &[
            ("DOMAIN", &config.domain),
            ("HTTP_NAME", &http_name),
            ("HTTPS_NAME", &https_name),
        ],
        &body,
    )
}
